//! Error types for toolshield
//!
//! Every failure a caller can observe from the executor is one of:
//! - Admission errors: circuit open, bulkhead wait cancelled (never retried)
//! - Attempt errors: per-attempt timeout or a tool-reported error
//! - Terminal errors: the last attempt error wrapped with the attempt count

use thiserror::Error;

/// Main error type for tool execution
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Breaker for this tool is open (or half-open with a probe in flight)
    #[error("Circuit breaker open for tool '{tool}'")]
    CircuitOpen { tool: String },

    /// Caller's context was cancelled
    #[error("Call cancelled")]
    Cancelled,

    /// Caller's context deadline passed
    #[error("Call deadline exceeded")]
    DeadlineExceeded,

    /// A single attempt ran past its per-attempt deadline
    #[error("Attempt timed out after {timeout_ms}ms")]
    AttemptTimeout { timeout_ms: u64 },

    /// Error reported by the tool itself
    #[error("Tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    /// Last attempt error, annotated with how many attempts were made
    #[error("Tool '{tool}' failed after {attempts} attempt(s): {source}")]
    Failed {
        tool: String,
        attempts: u32,
        #[source]
        source: Box<ExecutorError>,
    },

    /// Bulkhead semaphore was closed underneath a waiter
    #[error("Bulkhead closed")]
    BulkheadClosed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for executor operations
pub type Result<T> = std::result::Result<T, ExecutorError>;

impl ExecutorError {
    /// True for the fail-fast circuit-open rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self.last_error(), ExecutorError::CircuitOpen { .. })
    }

    /// True when the error came from the caller's own context
    /// (cancellation or deadline), looking through attempt wrappers and
    /// through tool errors that carry one of ours.
    pub fn is_cancellation(&self) -> bool {
        match self {
            ExecutorError::Cancelled | ExecutorError::DeadlineExceeded => true,
            ExecutorError::Failed { source, .. } => source.is_cancellation(),
            ExecutorError::Tool { source, .. } => source
                .chain()
                .filter_map(|cause| cause.downcast_ref::<ExecutorError>())
                .any(ExecutorError::is_cancellation),
            _ => false,
        }
    }

    /// Number of attempts made, if this is a terminal attempt error
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ExecutorError::Failed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Innermost error, with attempt wrappers peeled off
    pub fn last_error(&self) -> &ExecutorError {
        match self {
            ExecutorError::Failed { source, .. } => source.last_error(),
            other => other,
        }
    }
}
