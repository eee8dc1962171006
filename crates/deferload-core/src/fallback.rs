//! Fallback substitution when a deferred load ultimately fails.

use std::fmt;
use std::sync::Arc;

use crate::error::LoadError;

/// Builds a substitute from the terminal error.
pub type FallbackFn<T> = Arc<dyn Fn(&LoadError) -> T + Send + Sync>;

/// What to hand back instead of a terminal failure.
///
/// Successful loads are never touched.
pub enum FallbackStrategy<T> {
    /// Surface the terminal error
    Fail,

    /// Substitute a fixed value
    Value(T),

    /// Build a substitute from the error, e.g. an error view showing its message
    With(FallbackFn<T>),
}

impl<T> Default for FallbackStrategy<T> {
    fn default() -> Self {
        Self::Fail
    }
}

impl<T: Clone> Clone for FallbackStrategy<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Fail => Self::Fail,
            Self::Value(value) => Self::Value(value.clone()),
            Self::With(build) => Self::With(Arc::clone(build)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FallbackStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => f.write_str("Fail"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::With(_) => f.write_str("With(<fn>)"),
        }
    }
}

impl<T: Clone> FallbackStrategy<T> {
    /// Substitute built from the terminal error.
    pub fn with(build: impl Fn(&LoadError) -> T + Send + Sync + 'static) -> Self {
        Self::With(Arc::new(build))
    }

    /// Apply the strategy to a settled load.
    pub fn resolve(&self, outcome: Result<T, LoadError>) -> Result<T, LoadError> {
        match (outcome, self) {
            (Ok(value), _) => Ok(value),
            (Err(err), Self::Fail) => Err(err),
            (Err(err), Self::Value(value)) => {
                tracing::warn!(error = %err, "Load failed, substituting fallback value");
                Ok(value.clone())
            }
            (Err(err), Self::With(build)) => {
                tracing::warn!(error = %err, "Load failed, building fallback from error");
                Ok(build(&err))
            }
        }
    }
}
