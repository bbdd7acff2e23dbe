//! Sliding-window rate limiter.
//!
//! Tracks timestamps of recent operations and admits a new one only while
//! the pruned count stays below the ceiling. `can_proceed` and `record`
//! are called as a pair around an admitted operation; the pairing is not
//! atomic, which is fine because each limiter has a single mutator (one
//! per client, plus the manager's global limiter behind a mutex).

use std::time::{Duration, Instant};

/// Sliding-window limiter state: a pruned log of recent operation times.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Maximum operations admitted per window.
    max_ops: u32,
    /// Window duration (60 seconds in production).
    window: Duration,
    /// Timestamps of operations within the window.
    timestamps: Vec<Instant>,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the standard 60-second window.
    pub fn per_minute(max_ops: u32) -> Self {
        Self::new(max_ops, Duration::from_secs(60))
    }

    /// Create a limiter with an explicit window (tests use short windows).
    pub fn new(max_ops: u32, window: Duration) -> Self {
        Self {
            max_ops,
            window,
            timestamps: Vec::new(),
        }
    }

    /// The configured ceiling.
    pub fn max_ops(&self) -> u32 {
        self.max_ops
    }

    /// Prune expired entries, then report whether another operation fits
    /// in the window. Does not record anything.
    pub fn can_proceed(&mut self) -> bool {
        let now = Instant::now();
        self.timestamps
            .retain(|t| now.duration_since(*t) < self.window);
        (self.timestamps.len() as u32) < self.max_ops
    }

    /// Record an admitted operation at the current time.
    pub fn record(&mut self) {
        self.timestamps.push(Instant::now());
    }
}
