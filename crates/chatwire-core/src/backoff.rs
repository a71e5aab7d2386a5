//! Reconnect backoff.

use std::time::Duration;

/// Bounded exponential backoff policy.
///
/// `delay(n) = min(base * growth_factor^(n - 1), max_delay)` for attempt `n >= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub growth_factor: f64,
    pub max_delay: Duration,
    /// Consecutive failed attempts after which no retry is scheduled.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            growth_factor: 1.5,
            max_delay: Duration::from_millis(5000),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before retrying after `attempts` attempts. Zero is treated as one.
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.max(1) - 1).unwrap_or(i32::MAX);
        let cap = self.max_delay.as_secs_f64();
        let secs = (self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent)).min(cap);
        if secs.is_finite() && secs >= 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }
}

/// Attempt counter plus the backoff it feeds.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts: u32,
    policy: Backoff,
}

impl RetryState {
    pub fn new(policy: Backoff) -> Self {
        Self { attempts: 0, policy }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Count an open attempt. Returns the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Back to a fresh start after a successful open or an external request.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Whether another automatic attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_attempts
    }

    pub fn next_delay(&self) -> Duration {
        self.policy.delay(self.attempts)
    }
}
