//! Orchestrator configuration
//!
//! Configuration is applied once, when the orchestrator is built, and is
//! validated before any recipe can run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the default per-task timeout in milliseconds
pub const ENV_TIMEOUT_MS: &str = "RELAYER_TIMEOUT_MS";

/// Environment variable holding the maximum number of concurrently running handlers
pub const ENV_MAX_CONCURRENCY: &str = "RELAYER_MAX_CONCURRENCY";

/// Environment variable holding the maximum accepted batch size
pub const ENV_MAX_BATCH_SIZE: &str = "RELAYER_MAX_BATCH_SIZE";

/// Errors raised while building or loading a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Timeout is zero or negative
    #[error("timeout must be positive")]
    NonPositiveTimeout,

    /// A concurrency or batch size limit is negative
    #[error("{field} must not be negative (got {value})")]
    NegativeLimit {
        /// Name of the offending limit
        field: &'static str,
        /// Value that was supplied
        value: i64,
    },

    /// An environment value is not an integer
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Environment variable name
        key: &'static str,
        /// Raw text that failed to parse
        value: String,
    },

    /// Malformed JSON configuration
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for an [`Orchestrator`](crate::batch::Orchestrator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Default per-task deadline
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,

    /// Maximum handlers running at once (0 = unbounded)
    pub max_concurrency: usize,

    /// Maximum sub-requests per batch (0 = unbounded)
    pub max_batch_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_concurrency: 0,
            max_batch_size: 0,
        }
    }
}

impl OrchestratorConfig {
    /// Check the configuration for values the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositiveTimeout);
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// Missing keys keep their defaults:
    ///
    /// ```rust
    /// use relayer::config::OrchestratorConfig;
    ///
    /// let config = OrchestratorConfig::from_json_str(r#"{"timeout_ms": 250, "max_batch_size": 10}"#).unwrap();
    /// assert_eq!(config.timeout.as_millis(), 250);
    /// assert_eq!(config.max_concurrency, 0);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from `RELAYER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults. Values are read as signed integers so
    /// that negative limits are reported instead of silently wrapping.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = read_integer(&lookup, ENV_TIMEOUT_MS)? {
            if ms <= 0 {
                return Err(ConfigError::NonPositiveTimeout);
            }
            config.timeout = Duration::from_millis(ms as u64);
        }
        if let Some(value) = read_integer(&lookup, ENV_MAX_CONCURRENCY)? {
            config.max_concurrency = non_negative("max_concurrency", value)?;
        }
        if let Some(value) = read_integer(&lookup, ENV_MAX_BATCH_SIZE)? {
            config.max_batch_size = non_negative("max_batch_size", value)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_integer<F>(lookup: &F, key: &'static str) -> Result<Option<i64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<usize, ConfigError> {
    usize::try_from(value).map_err(|_| ConfigError::NegativeLimit { field, value })
}

/// Serde adapter storing a `Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
