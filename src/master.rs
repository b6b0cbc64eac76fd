//! Master playback controller interface
//!
//! The engine never owns the primary video controller; it consumes it through
//! read-only queries plus an event stream. `MockMaster` provides a scriptable
//! implementation so sidecar behavior can be tested without any real video
//! pipeline.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Window attachment state of the master playback surface
///
/// Sidecars react to master events only while the window is `Attached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WindowPlaybackState {
    #[default]
    Attached,
    Attaching,
    Detaching,
}

/// Events emitted by the master controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MasterEvent {
    Play,
    Pause,
    Ended,
    Seeking,
    Seeked,
    /// Aggregate playback-state change
    PlaybackStateChange,
    /// Playback rate changed to the given factor
    RateChange(f64),
    /// Master clock advanced to the given media time (seconds)
    TimeChange(f64),
    WindowStateChange(WindowPlaybackState),
}

/// Read-only queries against the master controller
pub trait MasterPlayback {
    /// Current media time in seconds
    fn current_time(&self) -> f64;
    /// Media duration in seconds
    fn duration(&self) -> f64;
    /// Current playback rate factor
    fn playback_rate(&self) -> f64;
    /// Whether the master is playing
    fn is_playing(&self) -> bool;
    /// Window attachment state
    fn window_state(&self) -> WindowPlaybackState;
    /// Whether a seek is in flight
    fn is_seeking(&self) -> bool;
    /// Whether the master is waiting for data
    fn is_waiting(&self) -> bool;
    /// Whether playback reached the end
    fn is_ended(&self) -> bool;
    /// Whether the master is buffering
    fn is_buffering(&self) -> bool;
}

/// Inner scripted state of a [`MockMaster`]
#[derive(Debug, Clone)]
struct MockMasterState {
    current_time: f64,
    duration: f64,
    playback_rate: f64,
    playing: bool,
    window_state: WindowPlaybackState,
    seeking: bool,
    waiting: bool,
    ended: bool,
    buffering: bool,
}

/// A scriptable master controller for tests and headless hosts
///
/// Cloning shares the underlying state, so a test can hold one handle and
/// hand another to the sidecar under test.
#[derive(Clone)]
pub struct MockMaster {
    state: Arc<Mutex<MockMasterState>>,
}

impl Default for MockMaster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMaster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockMasterState {
                current_time: 0.0,
                duration: 0.0,
                playback_rate: 1.0,
                playing: false,
                window_state: WindowPlaybackState::Attached,
                seeking: false,
                waiting: false,
                ended: false,
                buffering: false,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockMasterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_current_time(&self, time: f64) {
        self.lock().current_time = time;
    }

    pub fn set_duration(&self, duration: f64) {
        self.lock().duration = duration;
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.lock().playback_rate = rate;
    }

    pub fn set_playing(&self, playing: bool) {
        self.lock().playing = playing;
    }

    pub fn set_window_state(&self, state: WindowPlaybackState) {
        self.lock().window_state = state;
    }

    pub fn set_seeking(&self, seeking: bool) {
        self.lock().seeking = seeking;
    }

    pub fn set_waiting(&self, waiting: bool) {
        self.lock().waiting = waiting;
    }

    pub fn set_ended(&self, ended: bool) {
        self.lock().ended = ended;
    }

    pub fn set_buffering(&self, buffering: bool) {
        self.lock().buffering = buffering;
    }
}

impl MasterPlayback for MockMaster {
    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn duration(&self) -> f64 {
        self.lock().duration
    }

    fn playback_rate(&self) -> f64 {
        self.lock().playback_rate
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn window_state(&self) -> WindowPlaybackState {
        self.lock().window_state
    }

    fn is_seeking(&self) -> bool {
        self.lock().seeking
    }

    fn is_waiting(&self) -> bool {
        self.lock().waiting
    }

    fn is_ended(&self) -> bool {
        self.lock().ended
    }

    fn is_buffering(&self) -> bool {
        self.lock().buffering
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_master_defaults() {
        let master = MockMaster::new();
        assert!(!master.is_playing());
        assert_eq!(master.window_state(), WindowPlaybackState::Attached);
        assert_eq!(master.playback_rate(), 1.0);
    }

    #[test]
    fn test_mock_master_shared_state() {
        let master = MockMaster::new();
        let clone = master.clone();
        master.set_playing(true);
        master.set_current_time(42.0);
        assert!(clone.is_playing());
        assert_eq!(clone.current_time(), 42.0);
    }
}
