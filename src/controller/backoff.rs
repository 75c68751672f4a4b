//! # Fibonacci Backoff
//!
//! Progressive retry delays for resources whose reconciliation keeps failing.
//!
//! The sequence follows 1s, 1s, 2s, 3s, 5s, 8s, ... scaled by the minimum and
//! capped at the maximum. Each resource tracks its own position.

/// Fibonacci backoff generator (seconds)
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
    prev: u64,
    curr: u64,
}

impl FibonacciBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            prev: 0,
            curr: 1,
        }
    }

    /// Return the next delay and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let delay = self.curr.saturating_mul(self.min_secs).min(self.max_secs);
        if delay < self.max_secs {
            let next = self.prev.saturating_add(self.curr);
            self.prev = self.curr;
            self.curr = next;
        }
        delay
    }
}

/// Per-resource error tracking kept by the error policy
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}
