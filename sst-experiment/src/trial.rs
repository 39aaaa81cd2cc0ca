use std::time::Duration;

use sst_core::Direction;

/// Fixed phase durations shared by every trial of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialDurations {
    pub fixation: Duration,
    /// Total response window; identical for go and stop trials.
    pub go: Duration,
    pub no_response_feedback: Duration,
}

impl TrialDurations {
    /// Splits the go window at the stop-signal delay.
    ///
    /// Returns `(pre_stop, stop_signal)`; the two always add up to `go`,
    /// so stimulus-on time does not depend on the SSD. An SSD longer than
    /// the go window leaves no stop-signal window.
    pub fn stop_windows(&self, ssd: Duration) -> (Duration, Duration) {
        let pre = ssd.min(self.go);
        (pre, self.go - pre)
    }
}

/// Valid response keys and the direction mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseKeys {
    pub valid: Vec<String>,
    pub left: String,
    pub right: String,
}

impl ResponseKeys {
    pub fn correct_for(&self, direction: Direction) -> &str {
        match direction {
            Direction::Left => &self.left,
            Direction::Right => &self.right,
        }
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.valid.iter().any(|k| k == key)
    }
}

/// Identity of the trial about to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialMeta {
    pub trial_id: u64,
    pub block_id: String,
    pub block_idx: usize,
}
