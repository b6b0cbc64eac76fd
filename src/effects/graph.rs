//! Route effects graphs
//!
//! An `AudioEffectsGraph` is the chain inserted into one routing cell. It is
//! created in the `Initializing` state while its processors are built on a
//! worker thread; the router polls the completion channel and only rewires
//! the route through the graph once the chain is `Ready`. A graph is never
//! mutated while initializing - reassignment attempts fail at the router.

use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};

use crate::effects::{create_effect, param_defs, Effect, EffectParam, EffectType};
use crate::graph::{AudioGraphContext, NodeId};

/// Definition of one effect in a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectNodeDef {
    pub effect_type: EffectType,
    #[serde(default)]
    pub params: Vec<EffectParam>,
}

/// Serializable definition of a whole route chain
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioEffectsGraphDef {
    pub effects: Vec<EffectNodeDef>,
}

/// Initialization state of a graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphInitState {
    Initializing,
    Ready,
    Failed(String),
}

/// Result of building a chain off-thread
pub type ChainResult = Result<Vec<Box<dyn Effect>>, String>;

/// The effect chain attached to a single routing cell
pub struct AudioEffectsGraph {
    def: AudioEffectsGraphDef,
    input: NodeId,
    output: NodeId,
    chain: Vec<Box<dyn Effect>>,
    state: GraphInitState,
}

impl AudioEffectsGraph {
    /// Allocate graph taps and start building the chain on a worker thread
    ///
    /// Returns the graph (in `Initializing` state) and the completion
    /// channel the owner must poll.
    pub fn begin(ctx: &AudioGraphContext, def: AudioEffectsGraphDef) -> (Self, Receiver<ChainResult>) {
        let input = ctx.create_gain(1.0, 1);
        let output = ctx.create_gain(1.0, 1);
        // Processors apply between the two taps
        let _ = ctx.connect(input, output);

        let (tx, rx) = bounded(1);
        let sample_rate = ctx.sample_rate() as f32;
        let build_def = def.clone();
        std::thread::spawn(move || {
            let chain: Vec<Box<dyn Effect>> = build_def
                .effects
                .iter()
                .map(|d| create_effect(d, sample_rate))
                .collect();
            let _ = tx.send(Ok(chain));
        });

        (
            Self {
                def,
                input,
                output,
                chain: Vec::new(),
                state: GraphInitState::Initializing,
            },
            rx,
        )
    }

    /// Install the built chain (or record the failure)
    pub fn complete(&mut self, result: ChainResult) {
        match result {
            Ok(chain) => {
                self.chain = chain;
                self.state = GraphInitState::Ready;
            }
            Err(e) => {
                self.state = GraphInitState::Failed(e);
            }
        }
    }

    /// Whether the chain finished initializing successfully
    pub fn is_initialized(&self) -> bool {
        self.state == GraphInitState::Ready
    }

    /// Current initialization state
    pub fn init_state(&self) -> &GraphInitState {
        &self.state
    }

    /// The node the route's splitter output feeds
    pub fn input(&self) -> NodeId {
        self.input
    }

    /// The node feeding the route's merger input
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Run the chain over a block of audio
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for effect in &mut self.chain {
            effect.process(left, right);
        }
    }

    /// Serialize the chain, capturing live parameter values when ready
    pub fn serialize_def(&self) -> AudioEffectsGraphDef {
        if !self.is_initialized() {
            return self.def.clone();
        }
        AudioEffectsGraphDef {
            effects: self
                .chain
                .iter()
                .map(|effect| EffectNodeDef {
                    effect_type: effect.effect_type(),
                    params: param_defs(effect.effect_type())
                        .iter()
                        .map(|d| EffectParam {
                            id: d.id,
                            value: effect.get_param(d.id),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Apply a parameter to every matching effect in the chain
    pub fn set_param(&mut self, param: EffectParam) {
        let target = param.id.effect_type();
        for effect in &mut self.chain {
            if effect.effect_type() == target {
                effect.set_param(param.id, param.value);
            }
        }
    }

    /// Enumerate the chain's effects with their live parameter values
    pub fn effects_info(&self) -> Vec<(EffectType, Vec<EffectParam>)> {
        self.chain
            .iter()
            .map(|effect| {
                let ty = effect.effect_type();
                let params = param_defs(ty)
                    .iter()
                    .map(|d| EffectParam {
                        id: d.id,
                        value: effect.get_param(d.id),
                    })
                    .collect();
                (ty, params)
            })
            .collect()
    }

    /// Remove the graph's taps from the context and drop the chain
    pub fn destroy(&mut self, ctx: &AudioGraphContext) {
        ctx.remove_node(self.input);
        ctx.remove_node(self.output);
        self.chain.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectParamId;
    use std::time::Duration;

    fn filter_delay_def() -> AudioEffectsGraphDef {
        AudioEffectsGraphDef {
            effects: vec![
                EffectNodeDef {
                    effect_type: EffectType::Filter,
                    params: vec![EffectParam {
                        id: EffectParamId::FilterCutoff,
                        value: 800.0,
                    }],
                },
                EffectNodeDef {
                    effect_type: EffectType::Gain,
                    params: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_graph_initializes_off_thread() {
        let ctx = AudioGraphContext::offline(48000, 2);
        let (mut graph, rx) = AudioEffectsGraph::begin(&ctx, filter_delay_def());
        assert!(!graph.is_initialized());

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        graph.complete(result);
        assert!(graph.is_initialized());
        assert_eq!(graph.effects_info().len(), 2);
    }

    #[test]
    fn test_serialize_def_round_trip() {
        let def = filter_delay_def();
        let json = serde_json::to_string(&def).unwrap();
        let back: AudioEffectsGraphDef = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }

    #[test]
    fn test_serialize_captures_live_params() {
        let ctx = AudioGraphContext::offline(48000, 2);
        let (mut graph, rx) = AudioEffectsGraph::begin(&ctx, filter_delay_def());
        graph.complete(rx.recv_timeout(Duration::from_secs(5)).unwrap());

        graph.set_param(EffectParam {
            id: EffectParamId::FilterCutoff,
            value: 123.0,
        });
        let def = graph.serialize_def();
        let cutoff = def.effects[0]
            .params
            .iter()
            .find(|p| p.id == EffectParamId::FilterCutoff)
            .unwrap();
        assert_eq!(cutoff.value, 123.0);
    }

    #[test]
    fn test_destroy_removes_taps() {
        let ctx = AudioGraphContext::offline(48000, 2);
        let (mut graph, rx) = AudioEffectsGraph::begin(&ctx, AudioEffectsGraphDef::default());
        graph.complete(rx.recv_timeout(Duration::from_secs(5)).unwrap());

        let input = graph.input();
        graph.destroy(&ctx);
        assert!(!ctx.node_exists(input));
    }
}
