//! Side-channel capabilities for failed attempts.
//!
//! Every failed attempt is logged, handed to an [`ErrorReporter`], and then
//! to the caller's [`ErrorObserver`] if one was supplied. Neither capability
//! can influence the retry loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Report kind attached to every failed attempt.
pub const DEFERRED_LOAD_FAILURE: &str = "deferred_load_failure";

/// Context forwarded to the error-reporting sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportContext {
    /// Zero-based index of the attempt that failed
    pub attempt_index: u32,

    /// Configured retry ceiling
    pub max_retries: u32,

    /// Always [`DEFERRED_LOAD_FAILURE`]
    pub kind: String,

    /// When the failure was observed
    pub occurred_at: DateTime<Utc>,
}

impl ReportContext {
    pub fn new(attempt_index: u32, max_retries: u32) -> Self {
        Self {
            attempt_index,
            max_retries,
            kind: DEFERRED_LOAD_FAILURE.to_string(),
            occurred_at: Utc::now(),
        }
    }

    /// Whether the loop will try again after this failure.
    pub fn will_retry(&self) -> bool {
        self.attempt_index < self.max_retries
    }
}

/// Caller-supplied observer, invoked once per failed attempt.
///
/// Must not panic. If it does, the loader catches and logs the panic and
/// carries on.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, error: &LoadError, attempt_index: u32);
}

impl<F> ErrorObserver for F
where
    F: Fn(&LoadError, u32) + Send + Sync,
{
    fn on_error(&self, error: &LoadError, attempt_index: u32) {
        self(error, attempt_index)
    }
}

/// Operational error sink. Fire-and-forget.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &LoadError, context: &ReportContext);
}

/// Default sink: a structured `tracing` event.
///
/// The loop also emits its own `warn!` diagnostic for each failure; this
/// event carries the report context on top of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &LoadError, context: &ReportContext) {
        tracing::error!(
            kind = %context.kind,
            attempt_index = context.attempt_index,
            max_retries = context.max_retries,
            occurred_at = %context.occurred_at,
            error = %error,
            "Deferred load failure reported"
        );
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ErrorReporter for NoopReporter {
    fn report(&self, _error: &LoadError, _context: &ReportContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_context_kind_and_retry_flag() {
        let ctx = ReportContext::new(1, 3);
        assert_eq!(ctx.kind, "deferred_load_failure");
        assert!(ctx.will_retry());
        assert!(!ReportContext::new(3, 3).will_retry());
    }

    #[test]
    fn test_context_serializes() {
        let json = serde_json::to_value(ReportContext::new(0, 2)).unwrap();
        assert_eq!(json["attempt_index"], 0);
        assert_eq!(json["max_retries"], 2);
        assert_eq!(json["kind"], "deferred_load_failure");
        assert!(json["occurred_at"].is_string());
    }

    #[test]
    fn test_closure_is_an_observer() {
        let calls = AtomicU32::new(0);
        let observer = |_: &LoadError, index: u32| {
            calls.fetch_add(index + 1, Ordering::SeqCst);
        };
        observer.on_error(&LoadError::attempt("x"), 0);
        observer.on_error(&LoadError::attempt("y"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
