//! Sidecar audio tracks
//!
//! A sidecar is an audio source that is not part of the master video's own
//! audio but must play in lock-step with it. Two strategies exist:
//! [`ElementBackedSidecarAudio`] streams through a media element and must
//! actively correct clock drift; [`BufferBackedSidecarAudio`] decodes the
//! whole source up front and restarts a one-shot buffer source on every
//! play, so each start is absolute and drift cannot accumulate. The factory
//! picks the buffer strategy on platforms whose streaming synchronization
//! primitives are unreliable.
//!
//! Shared across both: a per-track gain stage, volume/mute independent of
//! `active`, an on-demand router and peak processor, and the deduplicating
//! playback-state tracker.

pub mod buffer;
pub mod drift;
pub mod element;
pub mod mock;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

pub use buffer::BufferBackedSidecarAudio;
pub use drift::{DriftHistory, DRIFT_HISTORY_CAPACITY};
pub use element::{ElementBackedSidecarAudio, MediaElement, ReadyState, StreamingMediaElement};
pub use mock::MockMediaElement;

use crate::caps::PlatformCapabilities;
use crate::events::EventEmitter;
use crate::graph::{AudioGraphContext, NodeId};
use crate::master::{MasterEvent, MasterPlayback};
use crate::peak::{AudioMeterStandard, AudioPeakProcessor, AudioPeakProcessorState};
use crate::playback_state::{PlaybackState, PlaybackStateTracker};
use crate::router::{AudioRouter, AudioRouterState, InputSoloMuteState, RouterError};
use crate::track::{AudioTrack, SharedAudioTrack};

/// Why a sidecar load failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("cannot open {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("metadata probe failed: {0}")]
    Probe(String),
    #[error("audio output unavailable: {0}")]
    Output(String),
}

/// Load lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingEvent {
    Loading,
    Loaded,
}

/// Pure snapshot of a sidecar's externally visible state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarAudioState {
    pub active: bool,
    pub loaded: bool,
    pub track: AudioTrack,
    pub router: Option<AudioRouterState>,
    pub peak_processor: Option<AudioPeakProcessorState>,
    pub channel_count: Option<u16>,
    pub volume: f32,
    pub muted: bool,
}

/// State and wiring shared by both sidecar strategies
///
/// The gain node is created when loading completes, pinned to the probed
/// channel count, and feeds the destination directly until a router is
/// created.
pub struct SidecarBase {
    ctx: Arc<AudioGraphContext>,
    caps: PlatformCapabilities,
    track: SharedAudioTrack,
    gain: Option<NodeId>,
    volume: f32,
    muted: bool,
    loaded: bool,
    router: Option<AudioRouter>,
    peak: Option<AudioPeakProcessor>,
    tracker: PlaybackStateTracker,
    loading_events: EventEmitter<LoadingEvent>,
    state_changes: EventEmitter<SidecarAudioState>,
    volume_changes: EventEmitter<f32>,
    destroyed: bool,
}

impl SidecarBase {
    pub fn new(
        ctx: Arc<AudioGraphContext>,
        caps: PlatformCapabilities,
        track: SharedAudioTrack,
    ) -> Self {
        Self {
            ctx,
            caps,
            track,
            gain: None,
            volume: 1.0,
            muted: false,
            loaded: false,
            router: None,
            peak: None,
            tracker: PlaybackStateTracker::new(),
            loading_events: EventEmitter::new(),
            state_changes: EventEmitter::new(),
            volume_changes: EventEmitter::new(),
            destroyed: false,
        }
    }

    pub fn ctx(&self) -> &Arc<AudioGraphContext> {
        &self.ctx
    }

    pub fn caps(&self) -> PlatformCapabilities {
        self.caps
    }

    fn lock_track(&self) -> std::sync::MutexGuard<'_, AudioTrack> {
        self.track.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn track_src(&self) -> String {
        self.lock_track().src.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock_track().active
    }

    /// Flip the shared track's `active` flag (write-through; see
    /// [`crate::track`]) and notify state listeners
    pub fn set_active(&mut self, active: bool) {
        self.lock_track().active = active;
        self.emit_state();
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn channel_count(&self) -> Option<u16> {
        self.lock_track().channel_count
    }

    pub fn gain_node(&self) -> Option<NodeId> {
        self.gain
    }

    pub fn notify_loading(&mut self) {
        self.loading_events.emit(LoadingEvent::Loading);
    }

    /// Record a completed load: write the probed channel count through to
    /// the shared track, build the gain stage, and wire it into the router
    /// when one already exists, otherwise straight to the destination
    pub fn finish_load(&mut self, channel_count: u16) {
        self.lock_track().channel_count = Some(channel_count);

        let gain = self.ctx.create_gain(self.effective_gain(), channel_count);
        match self.router.as_mut() {
            Some(router) => router.connect_source(gain),
            None => {
                if let Err(e) = self.ctx.connect(gain, self.ctx.destination()) {
                    log::debug!("sidecar gain connect failed: {}", e);
                }
            }
        }
        self.gain = Some(gain);
        self.loaded = true;

        self.loading_events.emit(LoadingEvent::Loaded);
        self.emit_state();
    }

    fn effective_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    fn apply_gain(&self) {
        if let Some(gain) = self.gain {
            if let Err(e) = self.ctx.set_gain(gain, self.effective_gain()) {
                log::debug!("sidecar gain update failed: {}", e);
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.apply_gain();
        let volume = self.volume;
        self.volume_changes.emit(volume);
    }

    pub fn mute(&mut self) {
        if !self.muted {
            self.muted = true;
            self.apply_gain();
            self.emit_state();
        }
    }

    pub fn unmute(&mut self) {
        if self.muted {
            self.muted = false;
            self.apply_gain();
            self.emit_state();
        }
    }

    pub fn toggle_mute_unmute(&mut self) {
        if self.muted {
            self.unmute();
        } else {
            self.mute();
        }
    }

    /// Create the track's router once, rewiring the gain stage from the
    /// raw destination onto it (idempotent)
    pub fn create_audio_router(
        &mut self,
        inputs_number: Option<usize>,
        outputs_number: Option<usize>,
    ) {
        if self.router.is_some() {
            return;
        }
        let inputs =
            inputs_number.unwrap_or_else(|| self.channel_count().unwrap_or(2) as usize);
        let destination = self.ctx.destination();
        let mut router = match outputs_number {
            Some(outputs) => {
                AudioRouter::new_with_resolver(self.ctx.clone(), destination, inputs, |_| outputs)
            }
            None => AudioRouter::new(self.ctx.clone(), destination, inputs),
        };
        if let Some(gain) = self.gain {
            if let Err(e) = self.ctx.disconnect(gain, destination) {
                log::debug!("sidecar gain unrouted detach failed: {}", e);
            }
            router.connect_source(gain);
        }
        self.router = Some(router);
        self.emit_state();
    }

    /// Create the track's peak processor once (idempotent)
    pub fn create_audio_peak_processor(&mut self, standard: Option<AudioMeterStandard>) {
        if self.peak.is_some() {
            return;
        }
        let channel_count = self.channel_count().unwrap_or(2);
        let mut peak = AudioPeakProcessor::new(
            self.ctx.clone(),
            standard.unwrap_or_default(),
            channel_count,
        );
        if let Some(gain) = self.gain {
            peak.connect_source(gain);
        }
        self.peak = Some(peak);
        self.emit_state();
    }

    pub fn router(&self) -> Option<&AudioRouter> {
        self.router.as_ref()
    }

    pub fn router_mut(&mut self) -> Option<&mut AudioRouter> {
        self.router.as_mut()
    }

    pub fn peak_processor(&self) -> Option<&AudioPeakProcessor> {
        self.peak.as_ref()
    }

    pub fn tracker(&self) -> &PlaybackStateTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut PlaybackStateTracker {
        &mut self.tracker
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.tracker.state()
    }

    pub fn input_solo_mute_state(&self) -> Result<InputSoloMuteState, RouterError> {
        match &self.router {
            Some(router) => router.input_solo_mute_state(),
            None => Err(RouterError::NoSoloMuteState),
        }
    }

    /// Side-effect-free snapshot
    pub fn state(&self) -> SidecarAudioState {
        let track = self.lock_track().clone();
        SidecarAudioState {
            active: track.active,
            loaded: self.loaded,
            channel_count: track.channel_count,
            track,
            router: self.router.as_ref().map(|r| r.get_audio_router_state()),
            peak_processor: self.peak.as_ref().map(|p| p.state()),
            volume: self.volume,
            muted: self.muted,
        }
    }

    pub fn emit_state(&mut self) {
        let state = self.state();
        self.state_changes.emit(state);
    }

    pub fn subscribe_loading(&mut self) -> Receiver<LoadingEvent> {
        self.loading_events.subscribe()
    }

    pub fn subscribe_state_changes(&mut self) -> Receiver<SidecarAudioState> {
        self.state_changes.subscribe()
    }

    pub fn subscribe_volume_changes(&mut self) -> Receiver<f32> {
        self.volume_changes.subscribe()
    }

    pub fn subscribe_playback_state(&mut self) -> Receiver<PlaybackState> {
        self.tracker.subscribe()
    }

    /// Tear down owned sub-components and wiring
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.loading_events.close();
        self.state_changes.close();
        self.volume_changes.close();
        self.tracker.destroy();
        if let Some(mut router) = self.router.take() {
            router.destroy();
        }
        if let Some(mut peak) = self.peak.take() {
            peak.destroy();
        }
        if let Some(gain) = self.gain.take() {
            self.ctx.remove_node(gain);
        }
    }
}

/// A sidecar track under one of the two playback strategies
pub enum SidecarAudio {
    Element(ElementBackedSidecarAudio),
    Buffer(BufferBackedSidecarAudio),
}

/// Pick the strategy for the running platform
///
/// The buffer-backed strategy is used where streaming-element
/// synchronization is unreliable; otherwise the element-backed strategy
/// streams without decoding everything up front.
pub fn create_sidecar_audio(
    ctx: Arc<AudioGraphContext>,
    caps: PlatformCapabilities,
    track: SharedAudioTrack,
) -> SidecarAudio {
    if caps.unreliable_streaming_sync {
        SidecarAudio::Buffer(BufferBackedSidecarAudio::new(ctx, caps, track))
    } else {
        let src = track.lock().unwrap_or_else(|e| e.into_inner()).src.clone();
        let element = Box::new(StreamingMediaElement::new(src));
        SidecarAudio::Element(ElementBackedSidecarAudio::new(ctx, caps, track, element))
    }
}

impl SidecarAudio {
    fn base(&self) -> &SidecarBase {
        match self {
            SidecarAudio::Element(s) => s.base(),
            SidecarAudio::Buffer(s) => s.base(),
        }
    }

    fn base_mut(&mut self) -> &mut SidecarBase {
        match self {
            SidecarAudio::Element(s) => s.base_mut(),
            SidecarAudio::Buffer(s) => s.base_mut(),
        }
    }

    /// Load the source; resolves once all load stages complete
    pub fn load_source(&mut self) -> Result<(), LoadError> {
        match self {
            SidecarAudio::Element(s) => s.load_source(),
            SidecarAudio::Buffer(s) => s.load_source(),
        }
    }

    pub fn activate(&mut self, master: &dyn MasterPlayback) {
        match self {
            SidecarAudio::Element(s) => s.activate(master),
            SidecarAudio::Buffer(s) => s.activate(master),
        }
    }

    pub fn deactivate(&mut self, master: &dyn MasterPlayback) {
        match self {
            SidecarAudio::Element(s) => s.deactivate(master),
            SidecarAudio::Buffer(s) => s.deactivate(master),
        }
    }

    /// React to one master controller event
    pub fn handle_master_event(&mut self, master: &dyn MasterPlayback, event: MasterEvent) {
        match self {
            SidecarAudio::Element(s) => s.handle_master_event(master, event),
            SidecarAudio::Buffer(s) => s.handle_master_event(master, event),
        }
    }

    /// Periodic host-driven poll (buffering detection for the element
    /// strategy; a no-op for the buffer strategy)
    pub fn tick(&mut self) {
        if let SidecarAudio::Element(s) = self {
            s.tick();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.base_mut().set_volume(volume);
    }

    pub fn mute(&mut self) {
        self.base_mut().mute();
    }

    pub fn unmute(&mut self) {
        self.base_mut().unmute();
    }

    pub fn toggle_mute_unmute(&mut self) {
        self.base_mut().toggle_mute_unmute();
    }

    pub fn create_audio_router(
        &mut self,
        inputs_number: Option<usize>,
        outputs_number: Option<usize>,
    ) {
        self.base_mut().create_audio_router(inputs_number, outputs_number);
    }

    pub fn create_audio_peak_processor(&mut self, standard: Option<AudioMeterStandard>) {
        self.base_mut().create_audio_peak_processor(standard);
    }

    pub fn router_mut(&mut self) -> Option<&mut AudioRouter> {
        self.base_mut().router_mut()
    }

    pub fn get_sidecar_audio_state(&self) -> SidecarAudioState {
        self.base().state()
    }

    pub fn get_input_solo_mute_state(&self) -> Result<InputSoloMuteState, RouterError> {
        self.base().input_solo_mute_state()
    }

    pub fn subscribe_loading(&mut self) -> Receiver<LoadingEvent> {
        self.base_mut().subscribe_loading()
    }

    pub fn subscribe_state_changes(&mut self) -> Receiver<SidecarAudioState> {
        self.base_mut().subscribe_state_changes()
    }

    pub fn subscribe_volume_changes(&mut self) -> Receiver<f32> {
        self.base_mut().subscribe_volume_changes()
    }

    pub fn subscribe_playback_state(&mut self) -> Receiver<PlaybackState> {
        self.base_mut().subscribe_playback_state()
    }

    pub fn destroy(&mut self) {
        match self {
            SidecarAudio::Element(s) => s.destroy(),
            SidecarAudio::Buffer(s) => s.destroy(),
        }
    }
}
