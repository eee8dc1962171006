//! Retry policy and exponential backoff schedule.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Smallest backoff delay a policy will hold.
///
/// A zero base delay is clamped up to this value so a failing producer
/// can never be retried in a tight loop.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Bounded retry with exponential backoff.
///
/// Immutable for the lifetime of one loader. `max_retries` counts retries
/// after the first failure, so a policy makes `max_retries + 1` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

/// Wire form of [`RetryPolicy`]; the delay travels as whole milliseconds.
#[derive(Serialize, Deserialize)]
struct RawRetryPolicy {
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

impl From<RawRetryPolicy> for RetryPolicy {
    fn from(raw: RawRetryPolicy) -> Self {
        Self::new(raw.max_retries, Duration::from_millis(raw.retry_delay_ms))
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            retry_delay_ms: policy.retry_delay.as_millis().min(u64::MAX as u128) as u64,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy. A zero `retry_delay` is clamped to [`MIN_RETRY_DELAY`].
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        let retry_delay = if retry_delay < MIN_RETRY_DELAY {
            tracing::debug!(
                requested = ?retry_delay,
                clamped = ?MIN_RETRY_DELAY,
                "Retry delay below minimum, clamping"
            );
            MIN_RETRY_DELAY
        } else {
            retry_delay
        };

        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Policy that never retries; the first failure is terminal.
    pub fn no_retry() -> Self {
        Self::new(0, DEFAULT_RETRY_DELAY)
    }

    /// Replace the retry count.
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self::new(max_retries, self.retry_delay)
    }

    /// Replace the base delay (clamped like [`RetryPolicy::new`]).
    pub fn with_retry_delay(self, retry_delay: Duration) -> Self {
        Self::new(self.max_retries, retry_delay)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Total producer invocations when every attempt fails.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff slept after the failed attempt at `attempt_index` (0-based).
    ///
    /// `retry_delay * 2^attempt_index`, saturating at [`Duration::MAX`].
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(0);
        if factor == 0 {
            return Duration::MAX;
        }
        self.retry_delay.checked_mul(factor).unwrap_or(Duration::MAX)
    }

    /// The backoff delays in the order they would be slept.
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            policy: *self,
            next_index: 0,
        }
    }

    /// Sum of every backoff delay when all attempts fail.
    pub fn worst_case_delay(&self) -> Duration {
        self.schedule().fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// Iterator over the backoff delays of a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    policy: RetryPolicy,
    next_index: u32,
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_index >= self.policy.max_retries {
            return None;
        }
        let delay = self.policy.delay_for(self.next_index);
        self.next_index += 1;
        Some(delay)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.policy.max_retries - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BackoffSchedule {}
