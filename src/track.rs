//! Audio track value objects
//!
//! `AudioTrack` is owned by the player's track list; a sidecar wraps one
//! instance behind a `SharedAudioTrack` handle and writes its `active` and
//! `channel_count` fields back through it. That write-through is the one
//! deliberate exception to otherwise-local state ownership in this engine,
//! so external readers of the track list see activation and probed channel
//! counts without polling the sidecar.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sidecar audio track entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Stable identifier
    pub id: String,
    /// Source location (file path or URL)
    pub src: String,
    /// Whether the track is currently active (audible when the master plays)
    pub active: bool,
    /// Channel count, known only after loading
    pub channel_count: Option<u16>,
}

impl AudioTrack {
    /// Create an inactive, unloaded track for a source
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            src: src.into(),
            active: false,
            channel_count: None,
        }
    }
}

/// Shared handle to a track list entry
///
/// The sidecar mutates `active` and `channel_count` through this handle as a
/// side effect of its own lifecycle; all other fields are left untouched.
pub type SharedAudioTrack = Arc<Mutex<AudioTrack>>;

/// Wrap a track for sharing between the track list and a sidecar
pub fn shared(track: AudioTrack) -> SharedAudioTrack {
    Arc::new(Mutex::new(track))
}
