//! Element-backed sidecar strategy
//!
//! Streams through a media element instead of decoding everything up front.
//! The element has its own clock, so this strategy must measure drift
//! against the master on every time-change event and resynchronize once a
//! full sample window agrees the offset is real.
//!
//! Loading runs the metadata probe (symphonia) on a worker thread in
//! parallel with the element's own load; both must complete before the
//! track counts as loaded.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use rodio::{Decoder, OutputStream, Sink, Source};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::caps::PlatformCapabilities;
use crate::graph::{AudioGraphContext, NodeId};
use crate::master::{MasterEvent, MasterPlayback, WindowPlaybackState};
use crate::sidecar::drift::DriftHistory;
use crate::sidecar::{LoadError, SidecarBase};
use crate::track::SharedAudioTrack;

/// Steady-state buffering poll interval
const BUFFERING_POLL: Duration = Duration::from_millis(500);
/// Fast recovery poll, used only while a buffering condition is active
const RECOVERY_POLL: Duration = Duration::from_millis(200);
/// Mean drift beyond which a resynchronization fires
const DRIFT_THRESHOLD_SECS: f64 = 0.01;

/// Data readiness of a media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// The media element a streaming sidecar plays through
///
/// Mirrors the subset of element behavior the sync engine needs; the
/// production implementation is [`StreamingMediaElement`], tests script a
/// [`crate::sidecar::MockMediaElement`].
pub trait MediaElement {
    fn load(&mut self) -> Result<(), LoadError>;
    /// Element playback position in seconds
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, time: f64);
    fn play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn set_playback_rate(&mut self, rate: f64);
    fn set_volume(&mut self, volume: f32);
    /// Time ranges with decoded data available, as (start, end) seconds
    fn buffered_ranges(&self) -> Vec<(f64, f64)>;
    fn ready_state(&self) -> ReadyState;
    fn duration(&self) -> f64;
}

/// Production media element streaming through a rodio sink
pub struct StreamingMediaElement {
    src: String,
    _stream: Option<OutputStream>,
    sink: Option<Sink>,
    duration: f64,
    loaded: bool,
}

impl StreamingMediaElement {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            _stream: None,
            sink: None,
            duration: 0.0,
            loaded: false,
        }
    }
}

impl MediaElement for StreamingMediaElement {
    fn load(&mut self) -> Result<(), LoadError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| LoadError::Output(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| LoadError::Output(e.to_string()))?;

        let file = File::open(&self.src).map_err(|e| LoadError::Io {
            path: self.src.clone(),
            reason: e.to_string(),
        })?;
        let decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| LoadError::Decode(e.to_string()))?;
        self.duration = decoder
            .total_duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        sink.append(decoder);
        sink.pause();

        self._stream = Some(stream);
        self.sink = Some(sink);
        self.loaded = true;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.sink
            .as_ref()
            .map(|s| s.get_pos().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn set_current_time(&mut self, time: f64) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.try_seek(Duration::from_secs_f64(time.max(0.0))) {
                log::debug!("element seek to {:.3}s failed: {:?}", time, e);
            }
        }
    }

    fn play(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn is_paused(&self) -> bool {
        self.sink.as_ref().map(|s| s.is_paused()).unwrap_or(true)
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if let Some(sink) = &self.sink {
            sink.set_speed(rate as f32);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn buffered_ranges(&self) -> Vec<(f64, f64)> {
        // Local decoding keeps the whole file available once loaded
        if self.loaded {
            vec![(0.0, self.duration)]
        } else {
            Vec::new()
        }
    }

    fn ready_state(&self) -> ReadyState {
        if self.loaded {
            ReadyState::HaveEnoughData
        } else {
            ReadyState::HaveNothing
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

/// Resolve the first audio track's channel count without decoding
fn probe_channel_count(path: &str) -> Result<u16, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Io {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| LoadError::Probe(e.to_string()))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| LoadError::Probe("no audio track".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| LoadError::Probe("unknown channel layout".to_string()))?;
    Ok(channels.count() as u16)
}

/// Sidecar strategy streaming through a media element
pub struct ElementBackedSidecarAudio {
    base: SidecarBase,
    element: Box<dyn MediaElement>,
    source: Option<NodeId>,
    drift: DriftHistory,
    last_buffer_check: Option<Instant>,
}

impl ElementBackedSidecarAudio {
    pub fn new(
        ctx: Arc<AudioGraphContext>,
        caps: PlatformCapabilities,
        track: SharedAudioTrack,
        element: Box<dyn MediaElement>,
    ) -> Self {
        Self {
            base: SidecarBase::new(ctx, caps, track),
            element,
            source: None,
            drift: DriftHistory::new(),
            last_buffer_check: None,
        }
    }

    pub fn base(&self) -> &SidecarBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut SidecarBase {
        &mut self.base
    }

    /// Drift window contents (diagnostics)
    pub fn drift_history(&self) -> &DriftHistory {
        &self.drift
    }

    /// Load the element and probe metadata; both must complete
    pub fn load_source(&mut self) -> Result<(), LoadError> {
        self.base.notify_loading();

        let src = self.base.track_src();
        let (tx, rx) = bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(probe_channel_count(&src));
        });

        self.element.load()?;
        let channel_count = rx
            .recv()
            .map_err(|_| LoadError::Probe("probe worker terminated".to_string()))??;

        self.base.finish_load(channel_count);

        let source = self.base.ctx().create_source();
        if let Some(gain) = self.base.gain_node() {
            if let Err(e) = self.base.ctx().connect(source, gain) {
                log::debug!("element source connect failed: {}", e);
            }
        }
        self.source = Some(source);
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
    ///
    /// Inactive tracks stay paused regardless of what the master does;
    /// nothing happens while the window is attaching or detaching.
    pub fn re_evaluate(&mut self, master: &dyn MasterPlayback) {
        if master.window_state() != WindowPlaybackState::Attached {
            return;
        }
        if !self.base.is_active() {
            self.audio_pause();
            return;
        }
        if master.is_playing() {
            self.audio_play(master);
        } else {
            self.audio_pause();
        }
    }

    /// Start the element, resynchronizing its clock to the master both
    /// before and after the play call (the element may drift in the gap
    /// between committing to play and audio actually starting)
    fn audio_play(&mut self, master: &dyn MasterPlayback) {
        if !self.base.loaded() {
            return;
        }
        if self.base.playback_state().playing && !self.element.is_paused() {
            return;
        }
        self.element.set_current_time(master.current_time());
        self.element.play();
        self.element.set_current_time(master.current_time());
        self.drift.clear();
        self.base.tracker_mut().set_playing();
    }

    fn audio_pause(&mut self) {
        self.element.pause();
        self.base.tracker_mut().set_paused();
    }

    /// React to one master controller event
    pub fn handle_master_event(&mut self, master: &dyn MasterPlayback, event: MasterEvent) {
        match event {
            MasterEvent::TimeChange(time) => self.record_drift(master, time),
            MasterEvent::RateChange(rate) => {
                self.element.set_playback_rate(rate);
                self.drift.clear();
                self.re_evaluate(master);
            }
            MasterEvent::Seeked => {
                if self.is_attached_active(master) && self.base.playback_state().playing {
                    self.element.set_current_time(master.current_time());
                    self.drift.clear();
                }
                self.re_evaluate(master);
            }
            MasterEvent::Ended => {
                if self.is_attached_active(master) {
                    self.element.pause();
                    self.base.tracker_mut().set_ended();
                }
            }
            MasterEvent::Play
            | MasterEvent::Pause
            | MasterEvent::Seeking
            | MasterEvent::PlaybackStateChange
            | MasterEvent::WindowStateChange(_) => self.re_evaluate(master),
        }
    }

    /// Record one drift sample; correct only over a full window
    ///
    /// Samples are taken only while this track is actively playing and the
    /// master is in a clean playing state, so seeks and stalls never
    /// pollute the window.
    fn record_drift(&mut self, master: &dyn MasterPlayback, master_time: f64) {
        if !self.base.is_active() || !self.base.playback_state().playing {
            return;
        }
        if !master.is_playing()
            || master.is_seeking()
            || master.is_waiting()
            || master.is_ended()
            || master.is_buffering()
        {
            return;
        }

        let drift = master_time - self.element.current_time();
        self.drift.push(drift);

        if self.drift.is_full() {
            let mean = self.drift.mean();
            if mean.abs() > DRIFT_THRESHOLD_SECS {
                log::debug!("drift mean {:.4}s, resyncing to master", mean);
                self.element.set_current_time(master.current_time());
                self.drift.clear();
            }
        }
    }

    /// Periodic host-driven poll for buffering detection
    ///
    /// Checks every 500 ms whether the playback position lies within the
    /// element's buffered ranges (readiness state instead where range
    /// reporting is unreliable); while buffering, a 200 ms poll detects
    /// recovery promptly.
    pub fn tick(&mut self) {
        if !self.base.loaded() || !self.base.playback_state().playing {
            return;
        }
        let now = Instant::now();
        let interval = if self.base.playback_state().buffering {
            RECOVERY_POLL
        } else {
            BUFFERING_POLL
        };
        if self
            .last_buffer_check
            .is_some_and(|t| now.duration_since(t) < interval)
        {
            return;
        }
        self.last_buffer_check = Some(now);

        let stalled = self.detect_buffering();
        self.base.tracker_mut().set_buffering(stalled);
    }

    fn detect_buffering(&self) -> bool {
        if self.base.caps().unreliable_buffered_ranges {
            self.element.ready_state() < ReadyState::HaveFutureData
        } else {
            let pos = self.element.current_time();
            !self
                .element
                .buffered_ranges()
                .iter()
                .any(|&(start, end)| pos >= start && pos < end)
        }
    }

    pub fn destroy(&mut self) {
        self.element.pause();
        if let Some(source) = self.source.take() {
            self.base.ctx().remove_node(source);
        }
        self.base.destroy();
    }
}
