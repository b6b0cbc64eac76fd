//! State-variable filter effect
//!
//! Topology-preserving SVF with trapezoidal integration (Zavalishin form).
//! One pass yields the low-pass, band-pass and high-pass taps; resonance
//! controls the damping of the band integrator.

use crate::effects::{Effect, EffectParamId, EffectType};

const MIN_CUTOFF: f32 = 20.0;
const MAX_CUTOFF: f32 = 20000.0;
const MAX_RESONANCE: f32 = 0.95;

/// Filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)] // standard filter terminology
pub enum FilterMode {
    LowPass = 0,
    HighPass = 1,
    BandPass = 2,
}

impl From<f32> for FilterMode {
    fn from(value: f32) -> Self {
        match value as u32 {
            0 => FilterMode::LowPass,
            1 => FilterMode::HighPass,
            _ => FilterMode::BandPass,
        }
    }
}

/// Trapezoidal integrator memory for one channel
#[derive(Debug, Clone, Copy, Default)]
struct Integrators {
    ic1: f32,
    ic2: f32,
}

/// State-variable filter
pub struct FilterEffect {
    sample_rate: f32,
    cutoff: f32,
    resonance: f32,
    mode: FilterMode,
    channels: [Integrators; 2],
    // Coefficients derived from cutoff and resonance
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

impl FilterEffect {
    pub fn new(sample_rate: f32) -> Self {
        let mut effect = Self {
            sample_rate,
            cutoff: 1000.0,
            resonance: 0.3,
            mode: FilterMode::LowPass,
            channels: [Integrators::default(); 2],
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
        };
        effect.update_coefficients();
        effect
    }

    fn update_coefficients(&mut self) {
        // Cutoff stays below Nyquist so tan() never blows up
        let cutoff = self.cutoff.clamp(MIN_CUTOFF, self.sample_rate * 0.45);
        let g = (std::f32::consts::PI * cutoff / self.sample_rate).tan();
        // Resonance 0 is fully damped; MAX_RESONANCE approaches
        // self-oscillation without reaching it
        self.k = 2.0 * (1.0 - self.resonance);
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    fn run_channel(&self, samples: &mut [f32], state: &mut Integrators) {
        if !state.ic1.is_finite() || !state.ic2.is_finite() {
            *state = Integrators::default();
        }
        for sample in samples.iter_mut() {
            let v3 = *sample - state.ic2;
            let v1 = self.a1 * state.ic1 + self.a2 * v3;
            let v2 = state.ic2 + self.a2 * state.ic1 + self.a3 * v3;
            state.ic1 = 2.0 * v1 - state.ic1;
            state.ic2 = 2.0 * v2 - state.ic2;

            let out = match self.mode {
                FilterMode::LowPass => v2,
                FilterMode::BandPass => v1,
                FilterMode::HighPass => *sample - self.k * v1 - v2,
            };
            *sample = if out.is_finite() { out } else { 0.0 };
        }
    }
}

impl Effect for FilterEffect {
    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let mut channels = self.channels;
        self.run_channel(left, &mut channels[0]);
        self.run_channel(right, &mut channels[1]);
        self.channels = channels;
    }

    fn set_param(&mut self, id: EffectParamId, value: f32) {
        match id {
            EffectParamId::FilterCutoff => {
                self.cutoff = value.clamp(MIN_CUTOFF, MAX_CUTOFF);
                self.update_coefficients();
            }
            EffectParamId::FilterResonance => {
                self.resonance = value.clamp(0.0, MAX_RESONANCE);
                self.update_coefficients();
            }
            EffectParamId::FilterMode => {
                self.mode = FilterMode::from(value);
            }
            _ => {}
        }
    }

    fn get_param(&self, id: EffectParamId) -> f32 {
        match id {
            EffectParamId::FilterCutoff => self.cutoff,
            EffectParamId::FilterResonance => self.resonance,
            EffectParamId::FilterMode => self.mode as u32 as f32,
            _ => 0.0,
        }
    }

    fn reset(&mut self) {
        self.channels = [Integrators::default(); 2];
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }

    fn effect_type(&self) -> EffectType {
        EffectType::Filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn tone(freq: f32, len: usize, sample_rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_output_stays_finite_across_cutoffs() {
        for cutoff in [20.0, 500.0, 5000.0, 20000.0] {
            let mut filter = FilterEffect::new(48000.0);
            filter.set_param(EffectParamId::FilterCutoff, cutoff);

            let mut left = vec![1.0; 1024];
            let mut right = vec![1.0; 1024];
            filter.process(&mut left, &mut right);

            assert!(
                left.iter().chain(right.iter()).all(|x| x.is_finite()),
                "NaN at cutoff {}",
                cutoff
            );
        }
    }

    #[test]
    fn test_lowpass_attenuates_high_frequencies() {
        let mut filter = FilterEffect::new(48000.0);
        filter.set_param(EffectParamId::FilterCutoff, 500.0);
        filter.set_param(EffectParamId::FilterMode, 0.0);

        let mut left = tone(5000.0, 4800, 48000.0);
        let mut right = left.clone();
        let input_rms = rms(&left);
        filter.process(&mut left, &mut right);

        assert!(rms(&left) < input_rms * 0.2);
    }

    #[test]
    fn test_highpass_attenuates_low_frequencies() {
        let mut filter = FilterEffect::new(48000.0);
        filter.set_param(EffectParamId::FilterCutoff, 5000.0);
        filter.set_param(EffectParamId::FilterMode, 1.0);

        let mut left = tone(200.0, 4800, 48000.0);
        let mut right = left.clone();
        let input_rms = rms(&left);
        filter.process(&mut left, &mut right);

        assert!(rms(&left) < input_rms * 0.2);
    }

    #[test]
    fn test_bandpass_prefers_center_frequency() {
        let mut filter = FilterEffect::new(48000.0);
        filter.set_param(EffectParamId::FilterCutoff, 1000.0);
        filter.set_param(EffectParamId::FilterMode, 2.0);

        let mut center = tone(1000.0, 4800, 48000.0);
        let mut center_r = center.clone();
        filter.process(&mut center, &mut center_r);

        filter.reset();
        let mut far = tone(100.0, 4800, 48000.0);
        let mut far_r = far.clone();
        filter.process(&mut far, &mut far_r);

        assert!(rms(&far) < rms(&center) * 0.5);
    }

    #[test]
    fn test_resonance_boosts_the_cutoff_band() {
        let run = |resonance: f32| {
            let mut filter = FilterEffect::new(48000.0);
            filter.set_param(EffectParamId::FilterCutoff, 1000.0);
            filter.set_param(EffectParamId::FilterMode, 2.0);
            filter.set_param(EffectParamId::FilterResonance, resonance);

            let mut left = tone(1000.0, 9600, 48000.0);
            let mut right = left.clone();
            filter.process(&mut left, &mut right);
            rms(&left)
        };

        assert!(run(0.9) > run(0.0) * 2.0);
    }

    #[test]
    fn test_resonance_is_clamped() {
        let mut filter = FilterEffect::new(48000.0);
        filter.set_param(EffectParamId::FilterResonance, 2.0);
        assert_eq!(filter.get_param(EffectParamId::FilterResonance), 0.95);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = FilterEffect::new(48000.0);
        let mut left = tone(440.0, 256, 48000.0);
        let mut right = left.clone();
        filter.process(&mut left, &mut right);

        filter.reset();
        assert_eq!(filter.channels[0].ic1, 0.0);
        assert_eq!(filter.channels[0].ic2, 0.0);
    }
}
