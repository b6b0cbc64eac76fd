//! Scriptable media element for sidecar tests
//!
//! Shares its state across clones, so a test keeps one handle while the
//! sidecar under test owns another. Records play calls and every seek.

use std::sync::{Arc, Mutex};

use crate::sidecar::element::{MediaElement, ReadyState};
use crate::sidecar::LoadError;

#[derive(Debug, Clone)]
struct MockElementState {
    current_time: f64,
    paused: bool,
    playback_rate: f64,
    volume: f32,
    buffered: Vec<(f64, f64)>,
    ready_state: ReadyState,
    duration: f64,
    load_error: Option<String>,
    play_calls: usize,
    seeks: Vec<f64>,
}

/// A media element whose behavior is scripted by the test
#[derive(Clone)]
pub struct MockMediaElement {
    state: Arc<Mutex<MockElementState>>,
}

impl Default for MockMediaElement {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaElement {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockElementState {
                current_time: 0.0,
                paused: true,
                playback_rate: 1.0,
                volume: 1.0,
                buffered: vec![(0.0, f64::INFINITY)],
                ready_state: ReadyState::HaveEnoughData,
                duration: 0.0,
                load_error: None,
                play_calls: 0,
                seeks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockElementState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `load()` fail
    pub fn set_load_error(&self, message: impl Into<String>) {
        self.lock().load_error = Some(message.into());
    }

    pub fn set_buffered_ranges(&self, ranges: Vec<(f64, f64)>) {
        self.lock().buffered = ranges;
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.lock().ready_state = state;
    }

    pub fn set_duration(&self, duration: f64) {
        self.lock().duration = duration;
    }

    /// Move the element clock without recording a seek
    pub fn force_current_time(&self, time: f64) {
        self.lock().current_time = time;
    }

    pub fn play_calls(&self) -> usize {
        self.lock().play_calls
    }

    /// Every `set_current_time` target, in call order
    pub fn seeks(&self) -> Vec<f64> {
        self.lock().seeks.clone()
    }

    pub fn playback_rate(&self) -> f64 {
        self.lock().playback_rate
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }
}

impl MediaElement for MockMediaElement {
    fn load(&mut self) -> Result<(), LoadError> {
        if let Some(message) = self.lock().load_error.clone() {
            return Err(LoadError::Decode(message));
        }
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn set_current_time(&mut self, time: f64) {
        let mut state = self.lock();
        state.current_time = time;
        state.seeks.push(time);
    }

    fn play(&mut self) {
        let mut state = self.lock();
        state.paused = false;
        state.play_calls += 1;
    }

    fn pause(&mut self) {
        self.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.lock().playback_rate = rate;
    }

    fn set_volume(&mut self, volume: f32) {
        self.lock().volume = volume;
    }

    fn buffered_ranges(&self) -> Vec<(f64, f64)> {
        self.lock().buffered.clone()
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready_state
    }

    fn duration(&self) -> f64 {
        self.lock().duration
    }
}
