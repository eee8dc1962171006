//! Opt-in handle registry.
//!
//! Loaders never coalesce on their own: two handles for the same resource
//! run two attempt sequences. Callers that want one shared sequence per key
//! go through a [`HandleRegistry`] explicitly.

use deferload_core::LoadPhase;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::Duration;

use crate::config::RegistryConfig;
use crate::handle::DeferredHandle;

/// Keyed cache of deferred handles using moka.
pub struct HandleRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    cache: Cache<String, DeferredHandle<T>>,
}

impl<T> HandleRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a registry holding at most `max_entries` handles for `ttl` each.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    /// The handle registered under `key`, creating it with `make` if absent.
    ///
    /// A handle that has settled in [`LoadPhase::Failed`] is replaced, so a
    /// terminal failure is never served again. Concurrent callers for the
    /// same key get the same handle and `make` runs at most once.
    pub async fn get_or_insert_with<F>(
        &self,
        key: impl Into<String>,
        make: F,
    ) -> DeferredHandle<T>
    where
        F: FnOnce() -> DeferredHandle<T>,
    {
        let key = key.into();
        let result = self
            .cache
            .entry(key.clone())
            .and_compute_with(move |cached| {
                let op = match cached {
                    Some(entry) if entry.value().phase() != LoadPhase::Failed => Op::Nop,
                    Some(_) => {
                        tracing::info!(key = %key, "Replacing failed handle");
                        Op::Put(make())
                    }
                    None => Op::Put(make()),
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::Inserted(entry)
            | CompResult::ReplacedWith(entry)
            | CompResult::Unchanged(entry)
            | CompResult::Removed(entry) => entry.into_value(),
            CompResult::StillNone(_) => unreachable!("absent key always gets a handle"),
        }
    }

    pub async fn get(&self, key: &str) -> Option<DeferredHandle<T>> {
        self.cache.get(key).await
    }

    /// Forget the handle under `key` so the next request starts a fresh load.
    ///
    /// In-flight forces of the old handle still settle normally.
    pub async fn reload(&self, key: &str) {
        tracing::info!(key, "Dropping cached handle for reload");
        self.cache.invalidate(key).await;
    }

    /// Clear the registry.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Number of registered handles.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl<T> Default for HandleRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}
