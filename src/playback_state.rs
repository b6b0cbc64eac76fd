//! Sidecar playback state tracking
//!
//! A pure value holder for the sidecar's own playback flags. Every mutation
//! funnels through `update_state`, which replaces the struct wholesale,
//! structurally compares old vs new, and notifies only when something
//! actually changed. Callers must never assume a `set_*` call produces an
//! observable event.

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::events::EventEmitter;

/// Playback flags for a sidecar track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub playing: bool,
    pub paused: bool,
    pub pausing: bool,
    pub waiting: bool,
    pub seeking: bool,
    pub buffering: bool,
    pub ended: bool,
    pub waiting_synced_media: bool,
}

/// Partial update merged into the current state
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackStatePatch {
    pub playing: Option<bool>,
    pub paused: Option<bool>,
    pub pausing: Option<bool>,
    pub waiting: Option<bool>,
    pub seeking: Option<bool>,
    pub buffering: Option<bool>,
    pub ended: Option<bool>,
    pub waiting_synced_media: Option<bool>,
}

/// Holds the flag struct and deduplicates change notifications
pub struct PlaybackStateTracker {
    state: PlaybackState,
    changes: EventEmitter<PlaybackState>,
}

impl Default for PlaybackStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateTracker {
    pub fn new() -> Self {
        Self {
            state: PlaybackState {
                paused: true,
                ..PlaybackState::default()
            },
            changes: EventEmitter::new(),
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Subscribe to deduplicated state changes
    pub fn subscribe(&mut self) -> Receiver<PlaybackState> {
        self.changes.subscribe()
    }

    /// Canonical "playing" combination
    pub fn set_playing(&mut self) {
        self.update_state(PlaybackStatePatch {
            playing: Some(true),
            paused: Some(false),
            pausing: Some(false),
            waiting: Some(false),
            seeking: Some(false),
            buffering: Some(false),
            ended: Some(false),
            ..Default::default()
        });
    }

    /// Canonical "paused" combination
    pub fn set_paused(&mut self) {
        self.update_state(PlaybackStatePatch {
            playing: Some(false),
            paused: Some(true),
            pausing: Some(false),
            waiting: Some(false),
            seeking: Some(false),
            buffering: Some(false),
            ..Default::default()
        });
    }

    /// Canonical "pause requested but not yet committed" combination
    pub fn set_pausing(&mut self) {
        self.update_state(PlaybackStatePatch {
            playing: Some(false),
            paused: Some(false),
            pausing: Some(true),
            ..Default::default()
        });
    }

    /// Canonical "ended" combination
    pub fn set_ended(&mut self) {
        self.update_state(PlaybackStatePatch {
            playing: Some(false),
            paused: Some(true),
            pausing: Some(false),
            waiting: Some(false),
            seeking: Some(false),
            buffering: Some(false),
            ended: Some(true),
            ..Default::default()
        });
    }

    pub fn set_waiting(&mut self, waiting: bool) {
        self.update_state(PlaybackStatePatch {
            waiting: Some(waiting),
            ..Default::default()
        });
    }

    pub fn set_seeking(&mut self, seeking: bool) {
        self.update_state(PlaybackStatePatch {
            seeking: Some(seeking),
            ..Default::default()
        });
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        self.update_state(PlaybackStatePatch {
            buffering: Some(buffering),
            ..Default::default()
        });
    }

    pub fn set_waiting_synced_media(&mut self, waiting: bool) {
        self.update_state(PlaybackStatePatch {
            waiting_synced_media: Some(waiting),
            ..Default::default()
        });
    }

    /// Merge a patch, emitting a change event only if a field differs
    pub fn update_state(&mut self, patch: PlaybackStatePatch) {
        let old = self.state;
        let mut new = old;

        if let Some(v) = patch.playing {
            new.playing = v;
        }
        if let Some(v) = patch.paused {
            new.paused = v;
        }
        if let Some(v) = patch.pausing {
            new.pausing = v;
        }
        if let Some(v) = patch.waiting {
            new.waiting = v;
        }
        if let Some(v) = patch.seeking {
            new.seeking = v;
        }
        if let Some(v) = patch.buffering {
            new.buffering = v;
        }
        if let Some(v) = patch.ended {
            new.ended = v;
        }
        if let Some(v) = patch.waiting_synced_media {
            new.waiting_synced_media = v;
        }

        if new != old {
            self.state = new;
            self.changes.emit(new);
        }
    }

    /// Disconnect all subscribers
    pub fn destroy(&mut self) {
        self.changes.close();
    }
}
