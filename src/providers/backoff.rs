//! Retry and rate-limit recovery policy.

use std::time::Duration;

use crate::core::source::FetchError;

/// Decides whether (and how long) to wait before retrying a failed fetch.
///
/// Rate-limited and transient errors are retried exactly once; a second
/// failure is final for that symbol in that pass. NotFound is a definitive
/// answer and is never retried, and a fatal error disables the adapter
/// entirely, so neither gets a delay.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub rate_limit_wait: Duration,
    pub transient_wait: Duration,
    pub escalation_threshold: u32,
    pub escalation_wait: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy {
            rate_limit_wait: Duration::from_secs(30),
            transient_wait: Duration::from_secs(2),
            escalation_threshold: 3,
            escalation_wait: Duration::from_secs(60),
        }
    }
}

impl RateLimitPolicy {
    /// Durations scaled down for tests.
    pub fn with_waits(rate_limit_wait: Duration, transient_wait: Duration) -> Self {
        RateLimitPolicy {
            rate_limit_wait,
            transient_wait,
            ..RateLimitPolicy::default()
        }
    }

    pub fn retry_delay(&self, error: &FetchError, attempt: u32) -> Option<Duration> {
        if attempt >= 1 {
            return None;
        }
        match error {
            FetchError::RateLimited => Some(self.rate_limit_wait),
            FetchError::Transient(_) => Some(self.transient_wait),
            FetchError::NotFound(_) | FetchError::Fatal(_) => None,
        }
    }

    pub fn streak(&self) -> FailureStreak {
        FailureStreak {
            threshold: self.escalation_threshold,
            count: 0,
        }
    }
}

/// Counts consecutive failed symbols within one batch. When the streak
/// reaches the threshold the batch pauses for an extended cool-down
/// instead of hammering a degraded provider.
#[derive(Debug)]
pub struct FailureStreak {
    threshold: u32,
    count: u32,
}

impl FailureStreak {
    pub fn record_success(&mut self) {
        self.count = 0;
    }

    /// Returns true when the caller should pause; the streak resets so the
    /// next failure starts a fresh count.
    pub fn record_failure(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            true
        } else {
            false
        }
    }
}
