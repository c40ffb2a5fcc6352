//! Consecutive-failure bookkeeping.

use serde::{Deserialize, Serialize};

/// Net count of failed ticks. A failed tick adds one, a successful tick
/// removes one, and the value never drops below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureCounter(u32);

impl FailureCounter {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn record_success(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn record_failure(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// Records the outcome of one tick.
    pub fn record(&mut self, success: bool) {
        if success {
            self.record_success();
        } else {
            self.record_failure();
        }
    }

    pub fn exceeds(&self, threshold: u32) -> bool {
        self.0 > threshold
    }

    /// If the counter is above `threshold`, resets it to zero and returns the
    /// count that triggered the alert.
    pub fn take_alert(&mut self, threshold: u32) -> Option<u32> {
        if self.exceeds(threshold) {
            let count = self.0;
            self.0 = 0;
            Some(count)
        } else {
            None
        }
    }
}
