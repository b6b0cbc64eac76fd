//! Per-route audio effect chains
//!
//! Routes in the router accept at most one effects graph each: a linear
//! chain of effect processors inserted between the splitter output and the
//! merger input of that routing cell. Chains are described by serializable
//! definitions, built asynchronously, and replaced wholesale on reassignment.

pub mod delay;
pub mod filter;
pub mod gain;
pub mod graph;

use serde::{Deserialize, Serialize};

pub use graph::{AudioEffectsGraph, AudioEffectsGraphDef, EffectNodeDef, GraphInitState};

/// Effect types available for route chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectType {
    /// State-variable filter (LP/HP/BP)
    Filter,
    /// Feedback delay
    Delay,
    /// Plain gain stage
    Gain,
}

impl EffectType {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            EffectType::Filter => "Filter",
            EffectType::Delay => "Delay",
            EffectType::Gain => "Gain",
        }
    }
}

/// Effect parameter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectParamId {
    // Filter parameters
    FilterCutoff,
    FilterResonance,
    FilterMode,

    // Delay parameters
    DelayTimeMs,
    DelayFeedback,
    DelayMix,

    // Gain parameters
    GainLevel,
}

impl EffectParamId {
    /// The effect type this parameter belongs to
    pub fn effect_type(&self) -> EffectType {
        match self {
            EffectParamId::FilterCutoff
            | EffectParamId::FilterResonance
            | EffectParamId::FilterMode => EffectType::Filter,
            EffectParamId::DelayTimeMs | EffectParamId::DelayFeedback | EffectParamId::DelayMix => {
                EffectType::Delay
            }
            EffectParamId::GainLevel => EffectType::Gain,
        }
    }
}

/// A parameter assignment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectParam {
    pub id: EffectParamId,
    pub value: f32,
}

/// Parameter definition: range and default
#[derive(Debug, Clone)]
pub struct EffectParamDef {
    pub id: EffectParamId,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// Get parameter definitions for an effect type
pub fn param_defs(effect_type: EffectType) -> Vec<EffectParamDef> {
    match effect_type {
        EffectType::Filter => vec![
            EffectParamDef {
                id: EffectParamId::FilterCutoff,
                min: 20.0,
                max: 20000.0,
                default: 1000.0,
            },
            EffectParamDef {
                id: EffectParamId::FilterResonance,
                min: 0.0,
                max: 0.95,
                default: 0.3,
            },
            EffectParamDef {
                id: EffectParamId::FilterMode,
                min: 0.0,
                max: 2.0,
                default: 0.0,
            },
        ],
        EffectType::Delay => vec![
            EffectParamDef {
                id: EffectParamId::DelayTimeMs,
                min: 10.0,
                max: 2000.0,
                default: 250.0,
            },
            EffectParamDef {
                id: EffectParamId::DelayFeedback,
                min: 0.0,
                max: 0.95,
                default: 0.5,
            },
            EffectParamDef {
                id: EffectParamId::DelayMix,
                min: 0.0,
                max: 1.0,
                default: 0.5,
            },
        ],
        EffectType::Gain => vec![EffectParamDef {
            id: EffectParamId::GainLevel,
            min: 0.0,
            max: 2.0,
            default: 1.0,
        }],
    }
}

/// Trait for effect processors in a route chain
///
/// Processors must be Send so chains can be built off the caller's thread.
pub trait Effect: Send {
    /// Process stereo audio in-place
    fn process(&mut self, left: &mut [f32], right: &mut [f32]);

    /// Set a parameter value
    fn set_param(&mut self, id: EffectParamId, value: f32);

    /// Get current parameter value
    fn get_param(&self, id: EffectParamId) -> f32;

    /// Reset internal state (delay lines, filter state)
    fn reset(&mut self);

    /// Set sample rate
    fn set_sample_rate(&mut self, sample_rate: f32);

    /// Get the effect type
    fn effect_type(&self) -> EffectType;
}

/// Build one effect processor from its definition
pub fn create_effect(def: &EffectNodeDef, sample_rate: f32) -> Box<dyn Effect> {
    let mut effect: Box<dyn Effect> = match def.effect_type {
        EffectType::Filter => Box::new(filter::FilterEffect::new(sample_rate)),
        EffectType::Delay => Box::new(delay::DelayEffect::new(sample_rate)),
        EffectType::Gain => Box::new(gain::GainEffect::new()),
    };
    for param in &def.params {
        effect.set_param(param.id, param.value);
    }
    effect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_id_effect_type() {
        assert_eq!(EffectParamId::FilterCutoff.effect_type(), EffectType::Filter);
        assert_eq!(
            EffectParamId::FilterResonance.effect_type(),
            EffectType::Filter
        );
        assert_eq!(EffectParamId::DelayMix.effect_type(), EffectType::Delay);
        assert_eq!(EffectParamId::GainLevel.effect_type(), EffectType::Gain);
    }

    #[test]
    fn test_create_effect_applies_params() {
        let def = EffectNodeDef {
            effect_type: EffectType::Filter,
            params: vec![EffectParam {
                id: EffectParamId::FilterCutoff,
                value: 440.0,
            }],
        };
        let effect = create_effect(&def, 48000.0);
        assert_eq!(effect.effect_type(), EffectType::Filter);
        assert_eq!(effect.get_param(EffectParamId::FilterCutoff), 440.0);
    }

    #[test]
    fn test_param_defs_have_sane_ranges() {
        for ty in [EffectType::Filter, EffectType::Delay, EffectType::Gain] {
            for def in param_defs(ty) {
                assert!(def.min <= def.default && def.default <= def.max);
                assert_eq!(def.id.effect_type(), ty);
            }
        }
    }
}
