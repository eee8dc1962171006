//! # deferload-runtime
//!
//! Resilient deferred-resource loading on tokio.
//!
//! Wraps an async, fallible producer (a code chunk, a remote asset, any unit
//! of work that can transiently fail) in a handle that:
//! - Starts work only when first forced, and runs one attempt sequence per handle
//! - Retries with exponential backoff (`retry_delay * 2^n`)
//! - Reports every failed attempt to a log, an error sink and an optional observer
//! - Fails with one descriptive, human-readable error once retries run out
//!
//! ## Example
//!
//! ```rust,ignore
//! use deferload_runtime::{create_resilient_loader, LoaderOptions};
//! use std::time::Duration;
//!
//! let handle = create_resilient_loader(
//!     || fetch_chunk("dashboard"),
//!     LoaderOptions::new()
//!         .max_retries(3)
//!         .retry_delay(Duration::from_millis(1000))
//!         .on_error(|err: &LoadError, attempt: u32| eprintln!("attempt {attempt}: {err}")),
//! );
//!
//! let chunk = handle.force().await?;
//! ```

pub mod config;
mod handle;
mod loader;
mod producer;
mod registry;

pub use config::{ConfigError, RegistryConfig, RetryConfig, RuntimeConfig};
pub use handle::DeferredHandle;
pub use loader::{create_resilient_loader, LoaderOptions, ResilientLoader};
pub use producer::{create_loader_from_producer, Producer};
pub use registry::HandleRegistry;

pub use deferload_core::{
    ErrorObserver, ErrorReporter, FallbackStrategy, LoadError, LoadPhase, NoopReporter,
    ReportContext, RetryPolicy, TracingReporter,
};
