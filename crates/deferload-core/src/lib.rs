//! # deferload-core
//!
//! Deterministic building blocks for resilient deferred-resource loading.
//!
//! This crate answers, without touching a clock or an executor:
//! - How long to wait before the next attempt?
//! - When to give up?
//! - What does the caller see when we do?
//!
//! The async attempt loop lives in `deferload-runtime`.
//!
//! ## Example
//!
//! ```rust
//! use deferload_core::{AttemptState, LoadError, RetryDecision, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(1, Duration::from_millis(500));
//! let mut state = AttemptState::new();
//!
//! match state.record_failure(LoadError::attempt("net down"), &policy) {
//!     RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_millis(500)),
//!     RetryDecision::Exhausted(_) => unreachable!(),
//! }
//! state.advance();
//!
//! let decision = state.record_failure(LoadError::attempt("net down"), &policy);
//! let RetryDecision::Exhausted(err) = decision else {
//!     unreachable!()
//! };
//! assert!(err.to_string().contains("2 attempts"));
//! ```

pub mod attempt;
pub mod error;
pub mod fallback;
pub mod policy;
pub mod report;

pub use attempt::{AttemptState, LoadPhase, RetryDecision};
pub use error::LoadError;
pub use fallback::{FallbackFn, FallbackStrategy};
pub use policy::{
    BackoffSchedule, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, MIN_RETRY_DELAY,
};
pub use report::{
    ErrorObserver, ErrorReporter, NoopReporter, ReportContext, TracingReporter,
    DEFERRED_LOAD_FAILURE,
};
