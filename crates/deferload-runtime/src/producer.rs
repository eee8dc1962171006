//! Producer capability for trait-object style callers.
//!
//! Closures are the common way to hand a producer to the loader. This trait
//! exists for producers that carry state and want a name in the logs.

use async_trait::async_trait;
use std::sync::Arc;

use deferload_core::LoadError;

use crate::handle::DeferredHandle;
use crate::loader::{create_resilient_loader, LoaderOptions};

/// Something that can produce a resource, possibly failing.
///
/// The loader only ever calls [`produce`](Producer::produce); it never
/// cancels or mutates the producer.
#[async_trait]
pub trait Producer<T>: Send + Sync {
    /// Make one attempt at producing the resource.
    async fn produce(&self) -> Result<T, LoadError>;

    /// Name used in log events.
    fn describe(&self) -> String {
        "producer".to_string()
    }
}

/// Wrap a [`Producer`] in a retrying handle.
///
/// The producer's [`describe`](Producer::describe) becomes the log label
/// unless `options` already sets one.
pub fn create_loader_from_producer<T>(
    producer: Arc<dyn Producer<T>>,
    options: LoaderOptions,
) -> DeferredHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    let options = match options.label {
        Some(_) => options,
        None => {
            let label = producer.describe();
            options.label(label)
        }
    };

    create_resilient_loader(
        move || {
            let producer = Arc::clone(&producer);
            async move { producer.produce().await }
        },
        options,
    )
}
