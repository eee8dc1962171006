//! The retry loop.
//!
//! Attempts are strictly sequential: attempt N+1 starts only after attempt N
//! has failed and its backoff has elapsed. Intermediate failures go to the
//! side channel (log, reporter, observer) and never to the caller.

use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use deferload_core::{
    AttemptState, ErrorObserver, ErrorReporter, LoadError, LoadPhase, ReportContext,
    RetryDecision, RetryPolicy, TracingReporter,
};

use crate::config::RetryConfig;
use crate::handle::{DeferredHandle, LoadProgress};

/// Options for a resilient loader.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Retry ceiling and backoff base
    pub policy: RetryPolicy,

    /// Caller observer, invoked on every failed attempt
    pub on_error: Option<Arc<dyn ErrorObserver>>,

    /// Operational error sink
    pub reporter: Arc<dyn ErrorReporter>,

    /// Name used in log events
    pub label: Option<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            on_error: None,
            reporter: Arc::new(TracingReporter),
            label: None,
        }
    }
}

impl std::fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("policy", &self.policy)
            .field("on_error", &self.on_error.is_some())
            .field("label", &self.label)
            .finish()
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options built from a loaded [`RetryConfig`].
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            policy: config.policy(),
            ..Default::default()
        }
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy = self.policy.with_max_retries(max_retries);
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.policy = self.policy.with_retry_delay(retry_delay);
        self
    }

    pub fn on_error(mut self, observer: impl ErrorObserver + 'static) -> Self {
        self.on_error = Some(Arc::new(observer));
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Wrap `producer` in a lazily-forced, retrying handle.
///
/// Nothing runs until the handle is first forced. See [`DeferredHandle`].
pub fn create_resilient_loader<F, Fut, T, E>(
    producer: F,
    options: LoaderOptions,
) -> DeferredHandle<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Display + Send + 'static,
{
    DeferredHandle::new(ResilientLoader::new(producer, options))
}

/// A producer paired with its retry options.
///
/// Every call to [`ResilientLoader::load`] is an independent logical load
/// with its own attempt counter.
pub struct ResilientLoader<F> {
    producer: F,
    options: LoaderOptions,
}

impl<F, Fut, T, E> ResilientLoader<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    pub fn new(producer: F, options: LoaderOptions) -> Self {
        Self { producer, options }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Run one logical load to completion.
    pub async fn load(&self) -> Result<T, LoadError> {
        self.run(&LoadProgress::new()).await
    }

    pub(crate) async fn run(&self, progress: &LoadProgress) -> Result<T, LoadError> {
        let policy = &self.options.policy;
        let mut state = AttemptState::new();

        loop {
            progress.begin_attempt();

            let err = match self.attempt().await {
                Ok(value) => {
                    progress.set_phase(LoadPhase::Succeeded);
                    tracing::debug!(
                        resource = self.label(),
                        attempt = state.attempt_index().saturating_add(1),
                        "Deferred load succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };

            let attempt_index = state.attempt_index();
            self.report_failure(&err, attempt_index);

            match state.record_failure(err, policy) {
                RetryDecision::Retry { delay } => {
                    progress.set_phase(LoadPhase::Backoff);
                    tracing::debug!(
                        resource = self.label(),
                        delay = ?delay,
                        next_attempt = attempt_index.saturating_add(2),
                        "Backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    state.advance();
                }
                RetryDecision::Exhausted(terminal) => {
                    progress.set_phase(LoadPhase::Failed);
                    tracing::error!(
                        resource = self.label(),
                        attempts = policy.total_attempts(),
                        error = %terminal,
                        "Deferred load failed, retries exhausted"
                    );
                    return Err(terminal);
                }
            }
        }
    }

    /// One producer invocation, normalized to [`LoadError`].
    async fn attempt(&self) -> Result<T, LoadError> {
        // The producer is called inside the block so a panic on call is caught too.
        let outcome = AssertUnwindSafe(async { (self.producer)().await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(LoadError::attempt(err)),
            Err(payload) => Err(LoadError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Log, report, then notify the observer, in that order.
    fn report_failure(&self, err: &LoadError, attempt_index: u32) {
        let policy = &self.options.policy;

        tracing::warn!(
            resource = self.label(),
            attempt = attempt_index.saturating_add(1),
            max_attempts = policy.total_attempts(),
            error = %err,
            "Deferred load attempt failed"
        );

        let context = ReportContext::new(attempt_index, policy.max_retries());
        let reporter = &self.options.reporter;
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| reporter.report(err, &context)))
        {
            tracing::error!(
                resource = self.label(),
                panic = %panic_message(payload.as_ref()),
                "Error reporter panicked, ignoring"
            );
        }

        if let Some(observer) = &self.options.on_error {
            if let Err(payload) =
                panic::catch_unwind(AssertUnwindSafe(|| observer.on_error(err, attempt_index)))
            {
                tracing::error!(
                    resource = self.label(),
                    panic = %panic_message(payload.as_ref()),
                    "Error observer panicked, ignoring"
                );
            }
        }
    }

    fn label(&self) -> &str {
        self.options.label.as_deref().unwrap_or("deferred")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
