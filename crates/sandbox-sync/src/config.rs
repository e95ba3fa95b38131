//! Queue configuration.
//!
//! Configuration is layered the usual way: defaults, then an optional TOML
//! file, then `SANDBOX_SYNC_*` environment overrides, then validation.
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! strategy = "exponential"
//! ```

use crate::errors::QueueError;
use crate::retry::{BackoffStrategy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SANDBOX_SYNC_";

/// Configuration for a [`SyncQueue`](crate::SyncQueue)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncQueueConfig {
    /// Retry behavior shared by every lane drainer
    pub retry: RetryPolicy,
}

impl SyncQueueConfig {
    /// Short delays for tests and local development
    pub fn for_testing() -> Self {
        Self {
            retry: RetryPolicy::exponential()
                .with_initial_delay(Duration::from_millis(10))
                .with_max_delay(Duration::from_millis(200)),
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, QueueError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, QueueError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SANDBOX_SYNC_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<(), QueueError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply overrides from an explicit set of variables
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "MAX_ATTEMPTS" => self.retry.max_attempts = parse_number(name, value)?,
                "INITIAL_DELAY_MS" => self.retry.initial_delay_ms = parse_number(name, value)?,
                "MAX_DELAY_MS" => self.retry.max_delay_ms = parse_number(name, value)?,
                "BACKOFF_STRATEGY" => {
                    self.retry.strategy = BackoffStrategy::parse(value).ok_or_else(|| {
                        QueueError::config(format!("unknown backoff strategy '{value}'"))
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.retry.max_attempts == 0 {
            return Err(QueueError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(QueueError::config(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.initial_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, QueueError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueueError::config(format!("{ENV_PREFIX}{name}: '{value}' is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SyncQueueConfig::from_toml_str(
            r#"
            [retry]
            initial_delay_ms = 250
            strategy = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.retry.strategy, BackoffStrategy::Linear);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay_ms, 30_000);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = SyncQueueConfig::default();
        config
            .merge_with_vars([
                ("SANDBOX_SYNC_MAX_ATTEMPTS", "5"),
                ("SANDBOX_SYNC_BACKOFF_STRATEGY", "fixed"),
                ("UNRELATED", "ignored"),
            ])
            .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.strategy, BackoffStrategy::Fixed);
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut config = SyncQueueConfig::default();
        let err = config
            .merge_with_vars([("SANDBOX_SYNC_MAX_DELAY_MS", "soon")])
            .unwrap_err();
        assert!(err.to_string().contains("MAX_DELAY_MS"));
    }

    #[test]
    fn validation_rejects_zero_attempts_and_inverted_delays() {
        let zero =
            SyncQueueConfig::default().with_retry(RetryPolicy::default().with_max_attempts(0));
        assert!(zero.validate().is_err());

        let inverted = SyncQueueConfig::default().with_retry(
            RetryPolicy::default()
                .with_initial_delay(Duration::from_secs(10))
                .with_max_delay(Duration::from_secs(1)),
        );
        assert!(inverted.validate().is_err());

        assert!(SyncQueueConfig::for_testing().validate().is_ok());
    }
}
