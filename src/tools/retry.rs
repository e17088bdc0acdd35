//! Retry policy with exponential backoff
//!
//! Retry rules:
//! - Only idempotent tools get more than one attempt
//! - Delay before attempt `n+1` is `initial_delay × 2^(n-1)`
//! - Optional per-delay cap and ±25% jitter (both off by default)
//! - Errors caused by the caller's own context are never retried

use crate::config::ExecutorConfig;
use crate::errors::{ExecutorError, Result};
use crate::tools::context::CallContext;
use crate::tools::types::Tool;
use std::time::Duration;

/// Retry policy shared by all calls of an executor
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for idempotent tools, including the first
    max_attempts: u32,

    /// Delay after the first failed attempt
    initial_delay: Duration,

    /// Optional cap on a single delay
    max_delay: Option<Duration>,

    /// Enable jitter
    enable_jitter: bool,
}

impl RetryPolicy {
    /// Create a policy without cap or jitter
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: None,
            enable_jitter: false,
        }
    }

    /// Create a policy from executor configuration
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            initial_delay: config.retry_initial_delay,
            max_delay: config.retry_max_delay,
            enable_jitter: config.retry_jitter,
        }
    }

    /// Cap individual delays
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, enable_jitter: bool) -> Self {
        self.enable_jitter = enable_jitter;
        self
    }

    /// Attempts allowed for this tool: configured maximum if idempotent, else 1
    pub fn max_attempts(&self, tool: &dyn Tool) -> u32 {
        if tool.annotations().idempotent {
            self.max_attempts
        } else {
            1
        }
    }

    /// Configured maximum for idempotent tools
    pub fn configured_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after attempt `attempt` (1-based) fails
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);

        if !self.enable_jitter {
            return delay;
        }

        // ±25% random variation
        let factor = 0.75 + rand::random::<f64>() * 0.5;
        let jittered = Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay);
        match self.max_delay {
            Some(cap) => jittered.min(cap),
            None => jittered,
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = 1u32
            .checked_shl(exponent)
            .and_then(|multiplier| self.initial_delay.checked_mul(multiplier))
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Worst-case total backoff across `attempts` attempts (jitter ignored)
    pub fn max_total_wait_time(&self, attempts: u32) -> Duration {
        (1..attempts).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.base_delay(attempt))
        })
    }

    /// Whether another attempt could help after this error
    pub fn is_retryable(&self, error: &ExecutorError) -> bool {
        match error {
            // Caller gave up; retrying cannot help
            ExecutorError::Cancelled | ExecutorError::DeadlineExceeded => false,

            // Per-attempt timeout while the caller is still live
            ExecutorError::AttemptTimeout { .. } => true,

            // Caller-context endings never arrive here wrapped; the attempt
            // loop reports those bare
            ExecutorError::Tool { .. } => true,

            ExecutorError::Failed { source, .. } => self.is_retryable(source),

            // Admission and configuration errors are terminal
            ExecutorError::CircuitOpen { .. }
            | ExecutorError::BulkheadClosed
            | ExecutorError::Config(_) => false,
        }
    }

    /// Sleep before the next attempt, aborting if `ctx` finishes first
    pub async fn backoff(&self, ctx: &CallContext, attempt: u32) -> Result<Duration> {
        let delay = self.next_delay(attempt);
        ctx.sleep(delay).await?;
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::{ToolAnnotations, ToolOutput};
    use async_trait::async_trait;
    use quickcheck_macros::quickcheck;
    use serde_json::Value;

    struct AnnotatedTool(ToolAnnotations);

    #[async_trait]
    impl Tool for AnnotatedTool {
        fn name(&self) -> &str {
            "annotated"
        }

        fn annotations(&self) -> ToolAnnotations {
            self.0
        }

        async fn execute(&self, _ctx: &CallContext, _input: Value) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::empty())
        }
    }

    #[test]
    fn test_max_attempts_gated_by_idempotence() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));

        let idempotent = AnnotatedTool(ToolAnnotations::default().with_idempotent(true));
        let destructive = AnnotatedTool(
            ToolAnnotations::default()
                .with_destructive(true)
                .with_idempotent(false),
        );

        assert_eq!(policy.max_attempts(&idempotent), 5);
        assert_eq!(policy.max_attempts(&destructive), 1);
        assert_eq!(policy.configured_attempts(), 5);
    }

    #[test]
    fn test_calculate_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1000));

        assert_eq!(policy.next_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.next_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.next_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.next_delay(4), Duration::from_millis(8000));
        assert_eq!(policy.next_delay(5), Duration::from_millis(16000));
    }

    #[test]
    fn test_delay_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.next_delay(3), Duration::from_millis(400));
        assert_eq!(policy.next_delay(4), Duration::from_millis(500));
        assert_eq!(policy.next_delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.next_delay(64), Duration::MAX);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000)).with_jitter(true);

        for _ in 0..100 {
            let delay = policy.next_delay(1);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_max_total_wait_time() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        // 10ms + 20ms between three attempts
        assert_eq!(policy.max_total_wait_time(3), Duration::from_millis(30));
        assert_eq!(policy.max_total_wait_time(1), Duration::ZERO);
    }

    #[test]
    fn test_is_retryable() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        assert!(policy.is_retryable(&ExecutorError::AttemptTimeout { timeout_ms: 100 }));
        assert!(policy.is_retryable(&ExecutorError::Tool {
            tool: "t".to_string(),
            source: anyhow::anyhow!("503 Service Unavailable"),
        }));

        assert!(!policy.is_retryable(&ExecutorError::Cancelled));
        assert!(!policy.is_retryable(&ExecutorError::DeadlineExceeded));
        assert!(!policy.is_retryable(&ExecutorError::CircuitOpen {
            tool: "t".to_string()
        }));
        // A tool's own internal cancellation is an ordinary tool failure
        assert!(policy.is_retryable(&ExecutorError::Tool {
            tool: "t".to_string(),
            source: anyhow::Error::new(ExecutorError::Cancelled),
        }));
    }

    #[tokio::test]
    async fn test_backoff_waits() {
        let policy = RetryPolicy::new(3, Duration::from_millis(15));
        let started = tokio::time::Instant::now();

        let waited = policy.backoff(&CallContext::new(), 1).await.unwrap();

        assert_eq!(waited, Duration::from_millis(15));
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_backoff_cancellable() {
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        let ctx = CallContext::with_timeout(Duration::from_millis(20));

        let err = policy.backoff(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, ExecutorError::DeadlineExceeded));
    }

    #[quickcheck]
    fn prop_delay_doubles(initial_ms: u16, attempt: u8) -> bool {
        let initial = Duration::from_millis(u64::from(initial_ms));
        let attempt = u32::from(attempt % 16) + 1;
        let policy = RetryPolicy::new(32, initial);

        policy.next_delay(attempt + 1) == policy.next_delay(attempt) * 2
    }
}
