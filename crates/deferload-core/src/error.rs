//! Error taxonomy for deferred loads.

use std::fmt::Display;
use thiserror::Error;

/// Errors produced while loading a deferred resource.
///
/// Producer failures of any type are normalized into [`LoadError::Attempt`]
/// before the retry loop looks at them. Only [`LoadError::ExhaustedRetries`]
/// ever reaches whoever awaits the handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A single producer invocation failed.
    #[error("{message}")]
    Attempt { message: String },

    /// The producer panicked while being polled.
    #[error("producer panicked: {message}")]
    Panicked { message: String },

    /// Every attempt failed. The message is meant for people, not matching.
    #[error(
        "Failed to load resource after {attempts} attempts: {last_error}. \
         This may be a temporary network problem, or the resource may no longer \
         exist (for example after a new deployment). Please reload the page or \
         retry the request."
    )]
    ExhaustedRetries { attempts: u32, last_error: String },
}

impl LoadError {
    /// Normalize any displayable producer failure.
    pub fn attempt(error: impl Display) -> Self {
        Self::Attempt {
            message: error.to_string(),
        }
    }

    /// Build the terminal error from the last attempt's failure.
    pub fn exhausted(attempts: u32, last_error: &LoadError) -> Self {
        Self::ExhaustedRetries {
            attempts,
            last_error: last_error.to_string(),
        }
    }

    /// Whether this error ends the load.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExhaustedRetries { .. })
    }

    /// The underlying failure text, without the terminal guidance.
    pub fn message(&self) -> &str {
        match self {
            Self::Attempt { message } | Self::Panicked { message } => message,
            Self::ExhaustedRetries { last_error, .. } => last_error,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::attempt(err)
    }
}

impl From<String> for LoadError {
    fn from(message: String) -> Self {
        Self::Attempt { message }
    }
}

impl From<&str> for LoadError {
    fn from(message: &str) -> Self {
        Self::attempt(message)
    }
}
