//! Retry policy: what happens after a failed attempt, and how long the loop
//! waits before the next one.

use std::time::Duration;

/// The next action for an event whose attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Back to pending; the loop picks it up again after the backoff.
    Retry,

    /// Budget exhausted; move to failed.
    GiveUp,
}

/// Retry policy for failed deliveries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Automatic attempts per event before it becomes `failed`.
    pub max_retries: u32,

    /// Delay after the first failure in a row.
    pub retry_interval: Duration,

    /// Growth factor for consecutive failures. 1.0 keeps a fixed interval.
    pub multiplier: f64,

    /// Upper bound on the backoff.
    pub max_delay: Duration,

    /// Pause between two successful deliveries.
    pub success_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_interval: Duration::from_secs(10),
            multiplier: 1.0,
            max_delay: Duration::from_secs(300),
            success_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Decide based on the attempt count *after* the failed attempt.
    pub fn decide(&self, attempts: u32) -> Decision {
        if attempts >= self.max_retries {
            Decision::GiveUp
        } else {
            Decision::Retry
        }
    }

    /// Delay before the next attempt after `consecutive_failures` failures in
    /// a row (1-indexed).
    ///
    /// delay = retry_interval * multiplier^(n - 1), capped at max_delay.
    pub fn backoff(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.retry_interval.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}
