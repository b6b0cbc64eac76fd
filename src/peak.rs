//! Audio peak metering collaborator
//!
//! The metering worklet itself is external to this engine; this wrapper only
//! knows how to wire one source into it, expose the shared level buffer the
//! meter writes into, and report a snapshot of its own configuration.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::graph::{AudioGraphContext, NodeId};

/// Metering standard the processor runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioMeterStandard {
    #[default]
    PeakSample,
    TruePeak,
}

/// Per-channel peak level (0.0 - 1.0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelLevels {
    pub peak: f32,
}

/// Shared buffer the off-thread meter writes into
pub type PeakLevelsBuffer = Arc<Mutex<Vec<ChannelLevels>>>;

/// Snapshot of a peak processor's configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPeakProcessorState {
    pub standard: AudioMeterStandard,
    pub connected: bool,
    pub channel_count: u16,
}

/// Wires a source into the external metering worklet
pub struct AudioPeakProcessor {
    ctx: Arc<AudioGraphContext>,
    standard: AudioMeterStandard,
    meter_node: NodeId,
    source: Option<NodeId>,
    levels: PeakLevelsBuffer,
    channel_count: u16,
}

impl AudioPeakProcessor {
    pub fn new(
        ctx: Arc<AudioGraphContext>,
        standard: AudioMeterStandard,
        channel_count: u16,
    ) -> Self {
        // The meter taps the signal without altering it; a unity gain node
        // stands in for the worklet's input.
        let meter_node = ctx.create_gain(1.0, channel_count);
        Self {
            ctx,
            standard,
            meter_node,
            source: None,
            levels: Arc::new(Mutex::new(vec![
                ChannelLevels::default();
                channel_count as usize
            ])),
            channel_count,
        }
    }

    /// Route a source into the meter, replacing any previous one
    pub fn connect_source(&mut self, node: NodeId) {
        self.disconnect_source();
        if let Err(e) = self.ctx.connect(node, self.meter_node) {
            log::debug!("peak processor connect failed: {}", e);
            return;
        }
        self.source = Some(node);
    }

    /// Detach the current source, if any (idempotent)
    pub fn disconnect_source(&mut self) {
        if let Some(source) = self.source.take() {
            if let Err(e) = self.ctx.disconnect(source, self.meter_node) {
                log::debug!("peak processor disconnect failed: {}", e);
            }
        }
    }

    /// Shared levels buffer for the embedding UI
    pub fn levels(&self) -> &PeakLevelsBuffer {
        &self.levels
    }

    /// Side-effect-free snapshot
    pub fn state(&self) -> AudioPeakProcessorState {
        AudioPeakProcessorState {
            standard: self.standard,
            connected: self.source.is_some(),
            channel_count: self.channel_count,
        }
    }

    /// Tear down the meter wiring
    pub fn destroy(&mut self) {
        self.disconnect_source();
        self.ctx.remove_node(self.meter_node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_replaces_previous_source() {
        let ctx = AudioGraphContext::offline(48000, 2);
        let mut peak = AudioPeakProcessor::new(ctx.clone(), AudioMeterStandard::PeakSample, 2);
        let a = ctx.create_gain(1.0, 2);
        let b = ctx.create_gain(1.0, 2);

        peak.connect_source(a);
        peak.connect_source(b);

        assert!(!ctx.is_connected(a, peak.meter_node));
        assert!(ctx.is_connected(b, peak.meter_node));
        assert!(peak.state().connected);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let ctx = AudioGraphContext::offline(48000, 2);
        let mut peak = AudioPeakProcessor::new(ctx.clone(), AudioMeterStandard::TruePeak, 2);
        let a = ctx.create_gain(1.0, 2);

        peak.connect_source(a);
        peak.disconnect_source();
        peak.disconnect_source();
        assert!(!peak.state().connected);
    }

    #[test]
    fn test_state_snapshot() {
        let ctx = AudioGraphContext::offline(48000, 6);
        let peak = AudioPeakProcessor::new(ctx, AudioMeterStandard::TruePeak, 6);
        let state = peak.state();
        assert_eq!(state.standard, AudioMeterStandard::TruePeak);
        assert_eq!(state.channel_count, 6);
        assert!(!state.connected);
    }
}
