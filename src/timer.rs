use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic stopwatch for a single timed operation.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time in fractional seconds.
    pub fn stop(self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Seconds from `start` to `end`, negative if `end` precedes `start`.
///
/// Computed from whole seconds plus the nanosecond remainder so
/// sub-second timestamps are not rounded.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    let secs = delta.num_seconds();
    let nanos = (delta - chrono::TimeDelta::seconds(secs))
        .num_nanoseconds()
        .unwrap_or(0);
    secs as f64 + nanos as f64 / 1e9
}
