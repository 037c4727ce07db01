//! Retry delay sequences for [`crate::reconnection::ReconnectionHandler`].
//!
//! A `Schedule` is consumed one delay at a time; it has no notion of when a
//! reconnection attempt actually happens, only how long to wait before the
//! next one (§2, §4.2).

use std::time::Duration;

/// Produces a (possibly infinite) sequence of retry delays.
pub trait Schedule: Send {
    /// Returns the next delay.
    fn next(&mut self) -> Duration;
}

/// Exponential backoff with a cap, grounded in the teacher's `RetryConfig`
/// (`initial_backoff_ms`, `max_backoff_ms`, `backoff_multiplier`): the same
/// growth policy, but driving a long-lived reconnection loop instead of a
/// single operation's retry count.
#[derive(Debug, Clone)]
pub struct ExponentialReconnectionSchedule {
    next_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl ExponentialReconnectionSchedule {
    /// Creates a schedule starting at `base_delay`, growing by `multiplier`
    /// each call, capped at `max_delay`.
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            next_delay: base_delay,
            max_delay,
            multiplier,
        }
    }
}

impl Schedule for ExponentialReconnectionSchedule {
    fn next(&mut self) -> Duration {
        let delay = self.next_delay;
        let grown = self.next_delay.mul_f64(self.multiplier);
        self.next_delay = grown.min(self.max_delay);
        delay
    }
}

/// A schedule that always returns the same delay. Used by tests that need
/// deterministic, non-exponential timing.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSchedule(pub Duration);

impl Schedule for ConstantSchedule {
    fn next(&mut self) -> Duration {
        self.0
    }
}
