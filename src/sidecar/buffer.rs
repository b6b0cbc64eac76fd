//! Buffer-backed sidecar strategy
//!
//! Decodes the whole source into memory at load time and restarts a
//! one-shot buffer source on every play, with the playback offset taken
//! from the master clock at the moment of the start. Every start is
//! absolute, so there is no cumulative drift to correct; a one-shot source
//! cannot be restarted, so each play discards the previous node first.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use crossbeam_channel::bounded;
use rodio::{Decoder, Source};

use crate::caps::PlatformCapabilities;
use crate::graph::{AudioGraphContext, NodeId};
use crate::master::{MasterEvent, MasterPlayback, WindowPlaybackState};
use crate::sidecar::{LoadError, SidecarBase};
use crate::track::SharedAudioTrack;

/// A fully decoded audio source
pub struct DecodedBuffer {
    pub samples: Vec<f32>,
    pub channel_count: u16,
    pub sample_rate: u32,
}

impl DecodedBuffer {
    /// Duration of the decoded audio in seconds
    pub fn duration(&self) -> f64 {
        if self.channel_count == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.channel_count as f64 / self.sample_rate as f64
    }
}

fn decode_file(path: &str) -> Result<DecodedBuffer, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Io {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| LoadError::Decode(e.to_string()))?;
    let channel_count = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples().collect();
    Ok(DecodedBuffer {
        samples,
        channel_count,
        sample_rate,
    })
}

/// Sidecar strategy playing a fully decoded in-memory buffer
pub struct BufferBackedSidecarAudio {
    base: SidecarBase,
    buffer: Option<DecodedBuffer>,
    source: Option<NodeId>,
}

impl BufferBackedSidecarAudio {
    pub fn new(
        ctx: Arc<AudioGraphContext>,
        caps: PlatformCapabilities,
        track: SharedAudioTrack,
    ) -> Self {
        Self {
            base: SidecarBase::new(ctx, caps, track),
            buffer: None,
            source: None,
        }
    }

    pub fn base(&self) -> &SidecarBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut SidecarBase {
        &mut self.base
    }

    pub fn buffer(&self) -> Option<&DecodedBuffer> {
        self.buffer.as_ref()
    }

    /// The live buffer-source node, if one is playing
    pub fn source_node(&self) -> Option<NodeId> {
        self.source
    }

    /// Decode the whole source up front; the channel count comes from the
    /// decoded stream
    pub fn load_source(&mut self) -> Result<(), LoadError> {
        self.base.notify_loading();

        let src = self.base.track_src();
        let (tx, rx) = bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(decode_file(&src));
        });
        let decoded = rx
            .recv()
            .map_err(|_| LoadError::Decode("decode worker terminated".to_string()))??;

        self.base.finish_load(decoded.channel_count);
        self.buffer = Some(decoded);
        Ok(())
    }

    pub fn activate(&mut self, master: &dyn MasterPlayback) {
        self.base.set_active(true);
        self.re_evaluate(master);
    }

    pub fn deactivate(&mut self, master: &dyn MasterPlayback) {
        self.base.set_active(false);
        self.re_evaluate(master);
    }

    fn is_attached_active(&self, master: &dyn MasterPlayback) -> bool {
        master.window_state() == WindowPlaybackState::Attached && self.base.is_active()
    }

    /// Decide play vs pause from the master and the active flag
    pub fn re_evaluate(&mut self, master: &dyn MasterPlayback) {
        if master.window_state() != WindowPlaybackState::Attached {
            return;
        }
        if !self.base.is_active() {
            self.audio_pause();
            return;
        }
        if master.is_playing() {
            if !self.base.playback_state().playing {
                self.audio_play(master);
            }
        } else {
            self.audio_pause();
        }
    }

    /// Start a fresh one-shot source at the master's current time
    ///
    /// The previous source node, if any, is discarded first; at most one
    /// source node is ever live.
    pub fn audio_play(&mut self, master: &dyn MasterPlayback) {
        if !self.base.loaded() {
            return;
        }
        if let Some(old) = self.source.take() {
            self.base.ctx().remove_node(old);
        }
        let source = self
            .base
            .ctx()
            .create_buffer_source(master.current_time());
        if let Some(gain) = self.base.gain_node() {
            if let Err(e) = self.base.ctx().connect(source, gain) {
                log::debug!("buffer source connect failed: {}", e);
            }
        }
        self.source = Some(source);
        self.base.tracker_mut().set_playing();
    }

    pub fn audio_pause(&mut self) {
        if let Some(source) = self.source.take() {
            self.base.ctx().remove_node(source);
        }
        self.base.tracker_mut().set_paused();
    }

    /// React to one master controller event
    ///
    /// Seeks and rate changes restart the source; since each start is
    /// absolute against the master clock, a restart is a complete resync.
    pub fn handle_master_event(&mut self, master: &dyn MasterPlayback, event: MasterEvent) {
        match event {
            MasterEvent::TimeChange(_) => {}
            MasterEvent::Seeking => {
                if self.is_attached_active(master) {
                    self.audio_pause();
                }
            }
            MasterEvent::Seeked | MasterEvent::RateChange(_) => {
                if self.is_attached_active(master) && master.is_playing() {
                    self.audio_play(master);
                } else {
                    self.re_evaluate(master);
                }
            }
            MasterEvent::Ended => {
                if self.is_attached_active(master) {
                    if let Some(source) = self.source.take() {
                        self.base.ctx().remove_node(source);
                    }
                    self.base.tracker_mut().set_ended();
                }
            }
            MasterEvent::Play
            | MasterEvent::Pause
            | MasterEvent::PlaybackStateChange
            | MasterEvent::WindowStateChange(_) => self.re_evaluate(master),
        }
    }

    pub fn destroy(&mut self) {
        if let Some(source) = self.source.take() {
            self.base.ctx().remove_node(source);
        }
        self.buffer = None;
        self.base.destroy();
    }
}
