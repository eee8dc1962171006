//! Runtime configuration.
//!
//! Loaded from YAML with human-readable durations:
//!
//! ```yaml
//! retry:
//!   max_retries: 3
//!   retry_delay: 1s
//! registry:
//!   max_entries: 1000
//!   ttl: 1h
//! ```
//!
//! `DEFERLOAD_MAX_RETRIES` and `DEFERLOAD_RETRY_DELAY` override the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use deferload_core::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};

/// Environment variable overriding [`RetryConfig::max_retries`].
pub const ENV_MAX_RETRIES: &str = "DEFERLOAD_MAX_RETRIES";

/// Environment variable overriding [`RetryConfig::retry_delay`].
pub const ENV_RETRY_DELAY: &str = "DEFERLOAD_RETRY_DELAY";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Retry settings as written in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay (e.g. "1s", "250ms")
    #[serde(default = "default_retry_delay", with = "duration_human")]
    pub retry_delay: Duration,
}

/// Handle registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// How long a handle stays registered
    #[serde(default = "default_ttl", with = "duration_human")]
    pub ttl: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_max_entries() -> u64 {
    1000
}

fn default_ttl() -> Duration {
    Duration::from_secs(3600)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl: default_ttl(),
        }
    }
}

impl RetryConfig {
    /// The policy this config describes. Zero delays are clamped.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

impl RuntimeConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Apply `DEFERLOAD_*` overrides from `lookup`, usually the process
    /// environment.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            self.retry.max_retries = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: ENV_MAX_RETRIES.to_string(),
                message: format!("{e}"),
            })?;
        }

        if let Some(raw) = lookup(ENV_RETRY_DELAY) {
            self.retry.retry_delay =
                humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::InvalidValue {
                    key: ENV_RETRY_DELAY.to_string(),
                    message: format!("{e}"),
                })?;
        }

        Ok(self)
    }
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_delay, Duration::from_secs(1));
        assert_eq!(config.registry.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
retry:
  max_retries: 5
  retry_delay: 250ms
registry:
  max_entries: 10
  ttl: 5m
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.retry_delay, Duration::from_millis(250));
        assert_eq!(config.registry.max_entries, 10);
        assert_eq!(config.registry.ttl, Duration::from_secs(300));

        let policy = config.retry.policy();
        assert_eq!(policy.total_attempts(), 6);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = RuntimeConfig::from_yaml("retry:\n  max_retries: 0\n").unwrap();
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(config.registry, RegistryConfig::default());
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = RuntimeConfig::from_yaml("retry:\n  retry_delay: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
    }

    #[test]
    fn test_zero_delay_clamped_in_policy() {
        let config = RuntimeConfig::from_yaml("retry:\n  retry_delay: 0s\n").unwrap();
        assert_eq!(config.retry.policy().retry_delay(), deferload_core::MIN_RETRY_DELAY);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(ENV_MAX_RETRIES, "7"), (ENV_RETRY_DELAY, "2s")]
            .into_iter()
            .collect();

        let config = RuntimeConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.retry.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_override() {
        let err = RuntimeConfig::default()
            .with_overrides(|key| (key == ENV_MAX_RETRIES).then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_RETRIES));
    }

    #[test]
    fn test_yaml_round_trip_keeps_human_durations() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("retry_delay: 1s"));
        assert!(yaml.contains("ttl: 1h"));
    }
}
