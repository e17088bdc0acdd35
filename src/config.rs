//! Executor configuration
//!
//! Built once from defaults plus overrides, either through the `with_*`
//! builder methods or a list of `ConfigOption`s. All counts and durations
//! must be positive; `normalized()` clamps anything that is not.

use crate::errors::{ExecutorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Default bulkhead capacity
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default consecutive failures before a breaker opens
pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 5;

/// Default open-state cooldown
pub const DEFAULT_CIRCUIT_BREAKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default total attempts (including the first)
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff delay
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Default per-attempt deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Bulkhead capacity (simultaneous tool executions)
    pub max_concurrent: usize,

    /// Consecutive failures before a breaker opens
    pub circuit_breaker_threshold: u32,

    /// How long an open breaker rejects before admitting a probe
    #[serde(rename = "circuit_breaker_timeout_ms", with = "millis")]
    pub circuit_breaker_timeout: Duration,

    /// Total attempts for idempotent tools, including the first
    pub retry_max_attempts: u32,

    /// Base delay for exponential backoff
    #[serde(rename = "retry_initial_delay_ms", with = "millis")]
    pub retry_initial_delay: Duration,

    /// Optional cap on a single backoff delay
    #[serde(rename = "retry_max_delay_ms", with = "opt_millis")]
    pub retry_max_delay: Option<Duration>,

    /// Apply ±25% jitter to backoff delays
    pub retry_jitter: bool,

    /// Per-attempt deadline
    #[serde(rename = "default_timeout_ms", with = "millis")]
    pub default_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            circuit_breaker_threshold: DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            circuit_breaker_timeout: DEFAULT_CIRCUIT_BREAKER_TIMEOUT,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            retry_max_delay: None,
            retry_jitter: false,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A single configuration override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOption {
    MaxConcurrent(usize),
    CircuitBreakerThreshold(u32),
    CircuitBreakerTimeout(Duration),
    RetryAttempts(u32),
    RetryDelay(Duration),
    MaxRetryDelay(Duration),
    RetryJitter(bool),
    Timeout(Duration),
}

impl ConfigOption {
    /// Apply this override to a config
    pub fn apply(self, config: &mut ExecutorConfig) {
        match self {
            ConfigOption::MaxConcurrent(n) => config.max_concurrent = n,
            ConfigOption::CircuitBreakerThreshold(n) => config.circuit_breaker_threshold = n,
            ConfigOption::CircuitBreakerTimeout(d) => config.circuit_breaker_timeout = d,
            ConfigOption::RetryAttempts(n) => config.retry_max_attempts = n,
            ConfigOption::RetryDelay(d) => config.retry_initial_delay = d,
            ConfigOption::MaxRetryDelay(d) => config.retry_max_delay = Some(d),
            ConfigOption::RetryJitter(enabled) => config.retry_jitter = enabled,
            ConfigOption::Timeout(d) => config.default_timeout = d,
        }
    }
}

impl ExecutorConfig {
    /// Default configuration with the given overrides applied in order
    pub fn from_options(options: impl IntoIterator<Item = ConfigOption>) -> Self {
        Self::default().with_options(options)
    }

    /// Apply overrides in order
    pub fn with_options(mut self, options: impl IntoIterator<Item = ConfigOption>) -> Self {
        for option in options {
            option.apply(&mut self);
        }
        self
    }

    /// Set bulkhead capacity
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Set breaker failure threshold
    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    /// Set breaker open-state cooldown
    pub fn with_circuit_breaker_timeout(mut self, timeout: Duration) -> Self {
        self.circuit_breaker_timeout = timeout;
        self
    }

    /// Set total attempts for idempotent tools
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = attempts;
        self
    }

    /// Set base backoff delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay = delay;
        self
    }

    /// Cap individual backoff delays
    pub fn with_max_retry_delay(mut self, max_delay: Duration) -> Self {
        self.retry_max_delay = Some(max_delay);
        self
    }

    /// Enable or disable backoff jitter
    pub fn with_retry_jitter(mut self, enabled: bool) -> Self {
        self.retry_jitter = enabled;
        self
    }

    /// Set per-attempt deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Reject non-positive values
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ExecutorError::Config("max_concurrent must be at least 1".into()));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ExecutorError::Config(
                "circuit_breaker_threshold must be at least 1".into(),
            ));
        }
        if self.circuit_breaker_timeout.is_zero() {
            return Err(ExecutorError::Config(
                "circuit_breaker_timeout must be positive".into(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(ExecutorError::Config("retry_max_attempts must be at least 1".into()));
        }
        if self.retry_initial_delay.is_zero() {
            return Err(ExecutorError::Config("retry_initial_delay must be positive".into()));
        }
        if matches!(self.retry_max_delay, Some(d) if d.is_zero()) {
            return Err(ExecutorError::Config("retry_max_delay must be positive".into()));
        }
        if self.default_timeout.is_zero() {
            return Err(ExecutorError::Config("default_timeout must be positive".into()));
        }
        Ok(())
    }

    /// Clamp non-positive values: counts to 1, durations to their defaults
    pub fn normalized(mut self) -> Self {
        if self.max_concurrent == 0 {
            warn!("max_concurrent was 0, clamping to 1");
            self.max_concurrent = 1;
        }
        if self.circuit_breaker_threshold == 0 {
            warn!("circuit_breaker_threshold was 0, clamping to 1");
            self.circuit_breaker_threshold = 1;
        }
        if self.circuit_breaker_timeout.is_zero() {
            warn!(
                default_ms = DEFAULT_CIRCUIT_BREAKER_TIMEOUT.as_millis() as u64,
                "circuit_breaker_timeout was 0, using default"
            );
            self.circuit_breaker_timeout = DEFAULT_CIRCUIT_BREAKER_TIMEOUT;
        }
        if self.retry_max_attempts == 0 {
            warn!("retry_max_attempts was 0, clamping to 1");
            self.retry_max_attempts = 1;
        }
        if self.retry_initial_delay.is_zero() {
            warn!(
                default_ms = DEFAULT_RETRY_INITIAL_DELAY.as_millis() as u64,
                "retry_initial_delay was 0, using default"
            );
            self.retry_initial_delay = DEFAULT_RETRY_INITIAL_DELAY;
        }
        if matches!(self.retry_max_delay, Some(d) if d.is_zero()) {
            warn!("retry_max_delay was 0, removing cap");
            self.retry_max_delay = None;
        }
        if self.default_timeout.is_zero() {
            warn!(
                default_ms = DEFAULT_TIMEOUT.as_millis() as u64,
                "default_timeout was 0, using default"
            );
            self.default_timeout = DEFAULT_TIMEOUT;
        }
        self
    }
}

/// Durations as integer milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.circuit_breaker_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.retry_initial_delay, Duration::from_millis(100));
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert!(config.retry_max_delay.is_none());
        assert!(!config.retry_jitter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ExecutorConfig::default()
            .with_max_concurrent(1)
            .with_circuit_breaker_threshold(2)
            .with_circuit_breaker_timeout(Duration::from_secs(5))
            .with_retry_attempts(4)
            .with_retry_delay(Duration::from_millis(10))
            .with_max_retry_delay(Duration::from_millis(80))
            .with_retry_jitter(true)
            .with_timeout(Duration::from_secs(2));

        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.circuit_breaker_threshold, 2);
        assert_eq!(config.circuit_breaker_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_max_attempts, 4);
        assert_eq!(config.retry_initial_delay, Duration::from_millis(10));
        assert_eq!(config.retry_max_delay, Some(Duration::from_millis(80)));
        assert!(config.retry_jitter);
        assert_eq!(config.default_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_options_apply_in_order() {
        let config = ExecutorConfig::from_options([
            ConfigOption::MaxConcurrent(4),
            ConfigOption::RetryAttempts(7),
            ConfigOption::MaxConcurrent(2),
            ConfigOption::Timeout(Duration::from_millis(500)),
        ]);

        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.retry_max_attempts, 7);
        assert_eq!(config.default_timeout, Duration::from_millis(500));
        assert_eq!(config.circuit_breaker_threshold, DEFAULT_CIRCUIT_BREAKER_THRESHOLD);
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        assert!(ExecutorConfig::default().with_max_concurrent(0).validate().is_err());
        assert!(ExecutorConfig::default()
            .with_circuit_breaker_threshold(0)
            .validate()
            .is_err());
        assert!(ExecutorConfig::default()
            .with_retry_delay(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ExecutorConfig::default()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());

        let err = ExecutorConfig::default().with_retry_attempts(0).validate().unwrap_err();
        assert!(matches!(err, ExecutorError::Config(_)));
    }

    #[test]
    fn test_normalized_clamps() {
        let config = ExecutorConfig::default()
            .with_max_concurrent(0)
            .with_circuit_breaker_threshold(0)
            .with_circuit_breaker_timeout(Duration::ZERO)
            .with_retry_attempts(0)
            .with_retry_delay(Duration::ZERO)
            .with_max_retry_delay(Duration::ZERO)
            .with_timeout(Duration::ZERO)
            .normalized();

        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.circuit_breaker_threshold, 1);
        assert_eq!(config.circuit_breaker_timeout, DEFAULT_CIRCUIT_BREAKER_TIMEOUT);
        assert_eq!(config.retry_max_attempts, 1);
        assert_eq!(config.retry_initial_delay, DEFAULT_RETRY_INITIAL_DELAY);
        assert!(config.retry_max_delay.is_none());
        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = ExecutorConfig::default()
            .with_retry_delay(Duration::from_millis(250))
            .with_max_retry_delay(Duration::from_secs(2));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["retry_initial_delay_ms"], 250);
        assert_eq!(json["retry_max_delay_ms"], 2000);
        assert_eq!(json["default_timeout_ms"], 30_000);

        // Missing keys fall back to defaults
        let partial: ExecutorConfig =
            serde_json::from_str(r#"{"max_concurrent": 3, "circuit_breaker_timeout_ms": 1500}"#)
                .unwrap();
        assert_eq!(partial.max_concurrent, 3);
        assert_eq!(partial.circuit_breaker_timeout, Duration::from_millis(1500));
        assert_eq!(partial.retry_max_attempts, DEFAULT_RETRY_MAX_ATTEMPTS);
        assert!(partial.retry_max_delay.is_none());
    }
}
