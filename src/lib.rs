//! toolshield - resilience layer for agent tool calls
//!
//! Every tool an agent invokes (file I/O, network, databases, SaaS APIs) may
//! be slow, flaky or down. `ToolExecutor` runs each call through one
//! thread-safe path that combines admission control, deadlines, retries and
//! cascading-failure isolation.
//!
//! # Architecture
//!
//! - **Bulkhead**: caps simultaneous executions
//! - **Circuit breakers**: one state machine per tool name
//! - **Retry policy**: exponential backoff, gated by idempotence
//! - **Timeout guard**: fresh deadline per attempt

pub mod errors;
pub mod config;
pub mod tools;

// Re-export commonly used types
pub use errors::{ExecutorError, Result};
pub use config::{ConfigOption, ExecutorConfig};
pub use tools::{
    BreakerPhase, CallContext, ExecutionResult, RiskLevel, Tool, ToolAnnotations, ToolExecutor,
    ToolOutput,
};
