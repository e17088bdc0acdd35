//! Resilient tool execution
//!
//! Wraps every tool invocation in four failure-handling layers:
//! - Bulkhead (bounded concurrency across the executor)
//! - Circuit breaker per tool name (fail fast on a broken dependency)
//! - Retry with exponential backoff (idempotent tools only)
//! - Per-attempt timeout derived from the caller's context

pub mod types;
pub mod context;
pub mod bulkhead;
pub mod breaker;
pub mod retry;
pub mod timeout;
pub mod executor;

// Re-export commonly used types
pub use types::{ExecutionResult, ExecutorStats, RiskLevel, Tool, ToolAnnotations, ToolOutput};
pub use context::CallContext;
pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use breaker::{Admission, BreakerPhase, BreakerSnapshot, CircuitBreakerRegistry};
pub use retry::RetryPolicy;
pub use timeout::{AttemptContext, TimeoutGuard};
pub use executor::ToolExecutor;
