//! Deferred handles with single in-flight execution.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use deferload_core::{FallbackStrategy, LoadError, LoadPhase};

use crate::loader::ResilientLoader;

/// Phase and attempt count of one load, readable from any handle clone.
#[derive(Debug)]
pub(crate) struct LoadProgress {
    phase: Mutex<LoadPhase>,
    attempts: AtomicU32,
}

impl LoadProgress {
    pub(crate) fn new() -> Self {
        Self {
            phase: Mutex::new(LoadPhase::Idle),
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn begin_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.set_phase(LoadPhase::Attempting);
    }

    pub(crate) fn set_phase(&self, next: LoadPhase) {
        let mut phase = self.phase.lock();
        debug_assert!(
            phase.can_transition_to(next),
            "illegal load phase transition {} -> {}",
            *phase,
            next
        );
        *phase = next;
    }

    pub(crate) fn phase(&self) -> LoadPhase {
        *self.phase.lock()
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

type SharedLoad<T> = Shared<BoxFuture<'static, Result<T, LoadError>>>;

/// A lazily-forced, retrying load.
///
/// The attempt sequence starts on the first [`force`](Self::force). Every
/// later or concurrent force, from this handle or any clone of it, joins the
/// same sequence and sees the same outcome. Distinct handles never share
/// attempts, even when built from the same producer.
///
/// Dropping every handle pauses the sequence where it stands; nothing is
/// cancelled inside the producer.
pub struct DeferredHandle<T> {
    load: SharedLoad<T>,
    progress: Arc<LoadProgress>,
}

impl<T> Clone for DeferredHandle<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            load: self.load.clone(),
            progress: Arc::clone(&self.progress),
        }
    }
}

impl<T> std::fmt::Debug for DeferredHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("phase", &self.progress.phase())
            .field("attempts", &self.progress.attempts())
            .finish()
    }
}

impl<T> DeferredHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new<F, Fut, E>(loader: ResilientLoader<F>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let progress = Arc::new(LoadProgress::new());
        let tracked = Arc::clone(&progress);
        let load = async move { loader.run(&tracked).await }.boxed().shared();

        Self { load, progress }
    }

    /// Resolve the handle, starting the load if nobody has yet.
    pub async fn force(&self) -> Result<T, LoadError> {
        self.load.clone().await
    }

    /// Resolve the handle, substituting per `fallback` on terminal failure.
    pub async fn force_with(&self, fallback: &FallbackStrategy<T>) -> Result<T, LoadError> {
        fallback.resolve(self.force().await)
    }

    /// The settled outcome, if there is one. Never starts the load.
    pub fn peek(&self) -> Option<Result<T, LoadError>> {
        self.load.peek().cloned()
    }

    pub fn phase(&self) -> LoadPhase {
        self.progress.phase()
    }

    /// Producer invocations made so far.
    pub fn attempts_made(&self) -> u32 {
        self.progress.attempts()
    }

    pub fn is_settled(&self) -> bool {
        self.phase().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{create_resilient_loader, LoaderOptions};
    use deferload_core::NoopReporter;
    use std::time::Duration;

    fn counting_producer(
        calls: Arc<AtomicU32>,
        failures: u32,
    ) -> impl Fn() -> BoxFuture<'static, Result<String, String>> + Send + Sync + 'static {
        move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                if n < failures {
                    Err("net down".to_string())
                } else {
                    Ok(format!("module-{n}"))
                }
            }
            .boxed()
        }
    }

    fn options(max_retries: u32) -> LoaderOptions {
        LoaderOptions::new()
            .max_retries(max_retries)
            .reporter(Arc::new(NoopReporter))
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_runs_before_force() {
        let calls = Arc::new(AtomicU32::new(0));
        let handle = create_resilient_loader(counting_producer(Arc::clone(&calls), 0), options(3));

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handle.phase(), LoadPhase::Idle);
        assert!(handle.peek().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_forces_share_one_sequence() {
        let calls = Arc::new(AtomicU32::new(0));
        let handle = create_resilient_loader(counting_producer(Arc::clone(&calls), 2), options(3));
        let other = handle.clone();

        let (a, b, c) = tokio::join!(handle.force(), other.force(), handle.force());

        assert_eq!(a, Ok("module-2".to_string()));
        assert_eq!(b, a);
        assert_eq!(c, a);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.attempts_made(), 3);
        assert_eq!(handle.phase(), LoadPhase::Succeeded);

        // Settled: later forces replay the outcome without new attempts.
        assert_eq!(handle.force().await, a);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(handle.peek(), Some(a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_is_sticky() {
        let calls = Arc::new(AtomicU32::new(0));
        let handle =
            create_resilient_loader(counting_producer(Arc::clone(&calls), u32::MAX), options(2));

        let first = handle.force().await.unwrap_err();
        assert!(first.to_string().contains("3 attempts"));
        assert_eq!(handle.phase(), LoadPhase::Failed);
        assert!(handle.is_settled());

        let second = handle.force().await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_handles_do_not_interfere() {
        let calls = Arc::new(AtomicU32::new(0));
        let producer = Arc::new(counting_producer(Arc::clone(&calls), u32::MAX));

        let first = create_resilient_loader(
            {
                let producer = Arc::clone(&producer);
                move || (*producer)()
            },
            options(3),
        );
        let second = create_resilient_loader(
            {
                let producer = Arc::clone(&producer);
                move || (*producer)()
            },
            options(3),
        );

        let (a, b) = tokio::join!(first.force(), second.force());

        assert!(a.unwrap_err().to_string().contains("4 attempts"));
        assert!(b.unwrap_err().to_string().contains("4 attempts"));
        assert_eq!(first.attempts_made(), 4);
        assert_eq!(second.attempts_made(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_reports_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let handle = create_resilient_loader(counting_producer(Arc::clone(&calls), 1), options(1));

        let forcing = tokio::spawn({
            let handle = handle.clone();
            async move { handle.force().await }
        });

        // First attempt takes 10ms, then a 1s backoff.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.phase(), LoadPhase::Backoff);
        assert_eq!(handle.attempts_made(), 1);

        assert_eq!(forcing.await.unwrap(), Ok("module-1".to_string()));
        assert_eq!(handle.phase(), LoadPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_with_fallback() {
        let calls = Arc::new(AtomicU32::new(0));
        let handle =
            create_resilient_loader(counting_producer(Arc::clone(&calls), u32::MAX), options(0));

        let fallback =
            FallbackStrategy::with(|err: &LoadError| format!("unavailable: {}", err.message()));
        assert_eq!(
            handle.force_with(&fallback).await,
            Ok("unavailable: net down".to_string())
        );
        assert!(handle.force_with(&FallbackStrategy::Fail).await.is_err());
    }
}
