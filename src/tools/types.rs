//! Tool contract and execution types
//!
//! Core types shared by the executor and tool implementations.

use crate::tools::context::CallContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Risk classification of a tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// Behavioral annotations a tool declares about itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolAnnotations {
    /// Does not modify external state
    pub read_only: bool,

    /// May destroy or overwrite external state
    pub destructive: bool,

    /// Repeating a call has the same effect as one call (safe to retry)
    pub idempotent: bool,

    /// Results may be cached by callers
    pub cacheable: bool,

    /// Risk classification
    pub risk_level: RiskLevel,
}

impl ToolAnnotations {
    /// Read-only and idempotent, the usual shape of a lookup
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            idempotent: true,
            ..Default::default()
        }
    }

    /// Mark as read-only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Mark as destructive
    pub fn with_destructive(mut self, destructive: bool) -> Self {
        self.destructive = destructive;
        self
    }

    /// Mark as idempotent
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Mark as cacheable
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Set risk level
    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }
}

/// A pluggable unit of work executed on behalf of an agent
///
/// Implementations should watch `ctx` and stop work once it is done; the
/// executor stops waiting at the deadline but cannot kill the operation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (one circuit breaker per distinct name)
    fn name(&self) -> &str;

    /// Behavioral annotations
    fn annotations(&self) -> ToolAnnotations;

    /// Execute the tool
    async fn execute(&self, ctx: &CallContext, input: Value) -> anyhow::Result<ToolOutput>;
}

/// Opaque output payload of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool-defined content
    pub content: Value,
}

impl ToolOutput {
    /// Wrap a payload
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Output with no payload
    pub fn empty() -> Self {
        Self { content: Value::Null }
    }
}

/// Result of a successful `execute` call
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Identifier for this call (appears in logs)
    pub call_id: Uuid,

    /// Tool that was executed
    pub tool: String,

    /// Output of the successful attempt
    pub output: ToolOutput,

    /// Wall-clock time from the first attempt start to completion
    pub duration: Duration,

    /// Attempts made, including the successful one
    pub attempts: u32,
}

impl ExecutionResult {
    /// Duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// Whether at least one retry happened
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Executor statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Calls that reached the attempt loop
    pub total_calls: u64,

    /// Calls that returned a result
    pub successful_calls: u64,

    /// Calls that returned an attempt error
    pub failed_calls: u64,

    /// Calls rejected by an open circuit
    pub rejected_calls: u64,

    /// Tool invocations across all calls
    pub attempts: u64,

    /// Invocations beyond the first of each call
    pub retries: u64,

    /// Time spent in attempt loops (ms)
    pub total_duration_ms: u64,
}

impl ExecutorStats {
    /// Record a completed call
    pub fn record_success(&mut self, attempts: u32, duration: Duration) {
        self.record_call(attempts, duration);
        self.successful_calls += 1;
    }

    /// Record a failed call
    pub fn record_failure(&mut self, attempts: u32, duration: Duration) {
        self.record_call(attempts, duration);
        self.failed_calls += 1;
    }

    /// Record a circuit-open rejection
    pub fn record_rejection(&mut self) {
        self.rejected_calls += 1;
    }

    fn record_call(&mut self, attempts: u32, duration: Duration) {
        self.total_calls += 1;
        self.attempts += u64::from(attempts);
        self.retries += u64::from(attempts.saturating_sub(1));
        self.total_duration_ms += duration.as_millis() as u64;
    }

    /// Average call duration
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_calls as f64
        }
    }

    /// Share of calls that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}
