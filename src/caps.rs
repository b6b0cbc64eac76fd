//! Platform capability detection
//!
//! A plain struct of booleans computed once at startup and handed to the
//! sidecar factory, instead of a lazily-initialized global. The flags capture
//! the one platform family whose streaming-element primitives are not
//! reliable enough for sample-accurate synchronization.

/// Capabilities of the host platform relevant to strategy selection
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformCapabilities {
    /// Streaming-element clocking is too unreliable for drift correction;
    /// the factory falls back to the decoded-buffer strategy.
    pub unreliable_streaming_sync: bool,
    /// Buffered-range reporting stalls during steady playback; buffering
    /// detection checks readiness state instead.
    pub unreliable_buffered_ranges: bool,
}

impl PlatformCapabilities {
    /// Detect capabilities for the current platform
    ///
    /// Conservative defaults: both primitives are assumed reliable. Hosts
    /// embedding this engine on a platform with known-bad streaming sync
    /// should construct the struct themselves.
    pub fn detect() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_defaults_to_reliable() {
        let caps = PlatformCapabilities::detect();
        assert!(!caps.unreliable_streaming_sync);
        assert!(!caps.unreliable_buffered_ranges);
    }
}
