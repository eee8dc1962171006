//! Per-load attempt bookkeeping.
//!
//! An [`AttemptState`] belongs to exactly one logical load. It is created
//! when the load starts and dropped when it settles; it is never shared
//! between loads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::LoadError;
use crate::policy::RetryPolicy;

/// Where a deferred load currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    /// Not forced yet
    Idle,

    /// Producer call in flight
    Attempting,

    /// Waiting out the delay before the next attempt
    Backoff,

    /// Resolved with a value
    Succeeded,

    /// Retries exhausted
    Failed,
}

impl LoadPhase {
    /// Terminal phases admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::Backoff => "backoff",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: LoadPhase) -> bool {
        use LoadPhase::*;
        matches!(
            (self, next),
            (Idle, Attempting)
                | (Attempting, Succeeded)
                | (Attempting, Backoff)
                | (Attempting, Failed)
                | (Backoff, Attempting)
        )
    }
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the loop should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try again.
    Retry { delay: Duration },

    /// Give up with this terminal error.
    Exhausted(LoadError),
}

/// Attempt counter and last failure for one load.
#[derive(Debug, Clone, Default)]
pub struct AttemptState {
    attempt_index: u32,
    last_error: Option<LoadError>,
}

impl AttemptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-based index of the current attempt.
    pub fn attempt_index(&self) -> u32 {
        self.attempt_index
    }

    pub fn last_error(&self) -> Option<&LoadError> {
        self.last_error.as_ref()
    }

    /// Record a failure of the current attempt and decide what comes next.
    ///
    /// The delay is computed from the index before it advances, so the
    /// first retry waits exactly the policy's base delay.
    pub fn record_failure(&mut self, error: LoadError, policy: &RetryPolicy) -> RetryDecision {
        let decision = if self.attempt_index < policy.max_retries() {
            RetryDecision::Retry {
                delay: policy.delay_for(self.attempt_index),
            }
        } else {
            RetryDecision::Exhausted(LoadError::exhausted(policy.total_attempts(), &error))
        };
        self.last_error = Some(error);
        decision
    }

    /// Move on to the next attempt once backoff has elapsed.
    pub fn advance(&mut self) {
        self.attempt_index += 1;
    }
}
