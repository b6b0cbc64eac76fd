//! Plain gain effect

use crate::effects::{Effect, EffectParamId, EffectType};

/// Scales the signal by a fixed level
pub struct GainEffect {
    level: f32,
}

impl Default for GainEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl GainEffect {
    pub fn new() -> Self {
        Self { level: 1.0 }
    }
}

impl Effect for GainEffect {
    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            *l *= self.level;
            *r *= self.level;
        }
    }

    fn set_param(&mut self, id: EffectParamId, value: f32) {
        if id == EffectParamId::GainLevel {
            self.level = value.clamp(0.0, 2.0);
        }
    }

    fn get_param(&self, id: EffectParamId) -> f32 {
        if id == EffectParamId::GainLevel {
            self.level
        } else {
            0.0
        }
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f32) {}

    fn effect_type(&self) -> EffectType {
        EffectType::Gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_scales_signal() {
        let mut gain = GainEffect::new();
        gain.set_param(EffectParamId::GainLevel, 0.5);

        let mut left = vec![1.0; 8];
        let mut right = vec![-1.0; 8];
        gain.process(&mut left, &mut right);

        assert!(left.iter().all(|&x| (x - 0.5).abs() < f32::EPSILON));
        assert!(right.iter().all(|&x| (x + 0.5).abs() < f32::EPSILON));
    }
}
