//! Drift sample history
//!
//! Fixed-capacity FIFO of signed master-vs-sidecar time deltas. Correction
//! decisions are made only over a full window so normal audio-rendering
//! jitter never triggers a resync.

/// Number of samples required before a correction decision
pub const DRIFT_HISTORY_CAPACITY: usize = 15;

/// Ring of the most recent drift samples (seconds, signed)
#[derive(Debug, Clone, Default)]
pub struct DriftHistory {
    samples: Vec<f64>,
}

impl DriftHistory {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(DRIFT_HISTORY_CAPACITY),
        }
    }

    /// Record a sample, evicting the oldest once at capacity
    pub fn push(&mut self, drift: f64) {
        if self.samples.len() == DRIFT_HISTORY_CAPACITY {
            self.samples.remove(0);
        }
        self.samples.push(drift);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether a full correction window has accumulated
    pub fn is_full(&self) -> bool {
        self.samples.len() == DRIFT_HISTORY_CAPACITY
    }

    /// Arithmetic mean over the recorded samples (0.0 when empty)
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_full_below_capacity() {
        let mut history = DriftHistory::new();
        for _ in 0..DRIFT_HISTORY_CAPACITY - 1 {
            history.push(0.5);
        }
        assert!(!history.is_full());

        history.push(0.5);
        assert!(history.is_full());
    }

    #[test]
    fn test_oldest_sample_evicted_first() {
        let mut history = DriftHistory::new();
        for i in 0..DRIFT_HISTORY_CAPACITY {
            history.push(i as f64);
        }
        history.push(100.0);

        assert_eq!(history.len(), DRIFT_HISTORY_CAPACITY);
        // Sample 0.0 is gone; mean reflects 1..=14 plus 100
        let expected = ((1..15).sum::<usize>() as f64 + 100.0) / 15.0;
        assert!((history.mean() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_mean_of_empty_is_zero() {
        assert_eq!(DriftHistory::new().mean(), 0.0);
    }

    #[test]
    fn test_clear_empties() {
        let mut history = DriftHistory::new();
        history.push(1.0);
        history.push(2.0);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.mean(), 0.0);
    }
}
