//! Stereo feedback delay effect
//!
//! Millisecond-denominated delay with feedback and dry/wet mix.

use crate::effects::{Effect, EffectParamId, EffectType};

/// Maximum delay time in milliseconds
const MAX_DELAY_MS: f32 = 2000.0;

/// Circular buffer for one delay line
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    size: usize,
}

impl DelayLine {
    fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples],
            write_pos: 0,
            size: max_samples,
        }
    }

    fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.size;
    }

    fn read(&self, delay_samples: usize) -> f32 {
        let delay = delay_samples.min(self.size - 1);
        let read_pos = (self.write_pos + self.size - delay) % self.size;
        self.buffer[read_pos]
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Feedback delay
pub struct DelayEffect {
    sample_rate: f32,
    /// Delay time in ms
    time_ms: f32,
    /// Feedback amount (0.0 - 0.95)
    feedback: f32,
    /// Dry/wet mix (0.0 = dry, 1.0 = wet)
    mix: f32,
    delay_l: DelayLine,
    delay_r: DelayLine,
    delay_samples: usize,
}

impl DelayEffect {
    pub fn new(sample_rate: f32) -> Self {
        let max_samples = (MAX_DELAY_MS / 1000.0 * sample_rate) as usize + 1;
        let mut effect = Self {
            sample_rate,
            time_ms: 250.0,
            feedback: 0.5,
            mix: 0.5,
            delay_l: DelayLine::new(max_samples),
            delay_r: DelayLine::new(max_samples),
            delay_samples: 0,
        };
        effect.update_delay_samples();
        effect
    }

    fn update_delay_samples(&mut self) {
        let samples = (self.time_ms / 1000.0 * self.sample_rate) as usize;
        self.delay_samples = samples.min(self.delay_l.size - 1);
    }
}

impl Effect for DelayEffect {
    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let delayed_l = self.delay_l.read(self.delay_samples);
            let delayed_r = self.delay_r.read(self.delay_samples);

            self.delay_l.write(*l + delayed_l * self.feedback);
            self.delay_r.write(*r + delayed_r * self.feedback);

            *l = *l * (1.0 - self.mix) + delayed_l * self.mix;
            *r = *r * (1.0 - self.mix) + delayed_r * self.mix;
        }
    }

    fn set_param(&mut self, id: EffectParamId, value: f32) {
        match id {
            EffectParamId::DelayTimeMs => {
                self.time_ms = value.clamp(10.0, MAX_DELAY_MS);
                self.update_delay_samples();
            }
            EffectParamId::DelayFeedback => {
                self.feedback = value.clamp(0.0, 0.95);
            }
            EffectParamId::DelayMix => {
                self.mix = value.clamp(0.0, 1.0);
            }
            _ => {}
        }
    }

    fn get_param(&self, id: EffectParamId) -> f32 {
        match id {
            EffectParamId::DelayTimeMs => self.time_ms,
            EffectParamId::DelayFeedback => self.feedback,
            EffectParamId::DelayMix => self.mix,
            _ => 0.0,
        }
    }

    fn reset(&mut self) {
        self.delay_l.clear();
        self.delay_r.clear();
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        let max_samples = (MAX_DELAY_MS / 1000.0 * sample_rate) as usize + 1;
        self.delay_l = DelayLine::new(max_samples);
        self.delay_r = DelayLine::new(max_samples);
        self.sample_rate = sample_rate;
        self.update_delay_samples();
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_reappears_after_delay_time() {
        let sample_rate = 1000.0;
        let mut delay = DelayEffect::new(sample_rate);
        delay.set_param(EffectParamId::DelayTimeMs, 100.0); // 100 samples
        delay.set_param(EffectParamId::DelayMix, 1.0); // wet only
        delay.set_param(EffectParamId::DelayFeedback, 0.0);

        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        left[0] = 1.0;
        right[0] = 1.0;
        delay.process(&mut left, &mut right);

        assert_eq!(left[0], 0.0);
        assert!(left[100] > 0.9, "impulse not delayed: {}", left[100]);
    }

    #[test]
    fn test_feedback_is_clamped() {
        let mut delay = DelayEffect::new(48000.0);
        delay.set_param(EffectParamId::DelayFeedback, 2.0);
        assert_eq!(delay.get_param(EffectParamId::DelayFeedback), 0.95);
    }

    #[test]
    fn test_reset_silences_tail() {
        let mut delay = DelayEffect::new(1000.0);
        delay.set_param(EffectParamId::DelayTimeMs, 50.0);
        delay.set_param(EffectParamId::DelayMix, 1.0);

        let mut left = vec![1.0; 64];
        let mut right = vec![1.0; 64];
        delay.process(&mut left, &mut right);

        delay.reset();
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        delay.process(&mut left, &mut right);
        assert!(left.iter().all(|&x| x == 0.0));
    }
}
