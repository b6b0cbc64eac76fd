//! sidecar-audio - multi-track audio routing and synchronization
//!
//! The audio engine of a video player: an N-input x M-output routing matrix
//! with solo/mute semantics and per-route effect chains, plus a sidecar
//! synchronization layer that keeps secondary audio tracks phase-locked to
//! a master video clock across independent loading and playback state
//! machines.

pub mod caps;
pub mod effects;
pub mod events;
pub mod graph;
pub mod master;
pub mod peak;
pub mod playback_state;
pub mod router;
pub mod sidecar;
pub mod track;
