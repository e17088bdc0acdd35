//! Resilient tool executor
//!
//! Every tool call goes through one path:
//! 1. Bulkhead slot (waits, honoring the caller's context)
//! 2. Circuit breaker check (fails fast when open)
//! 3. Attempt loop: per-attempt timeout → tool → breaker bookkeeping → retry decision
//! 4. Slot released on every exit path
//!
//! Admission failures never invoke the tool or consume an attempt.

use crate::config::{ConfigOption, ExecutorConfig};
use crate::errors::{ExecutorError, Result};
use crate::tools::breaker::{Admission, BreakerSnapshot, CircuitBreakerRegistry};
use crate::tools::bulkhead::Bulkhead;
use crate::tools::context::CallContext;
use crate::tools::retry::RetryPolicy;
use crate::tools::timeout::TimeoutGuard;
use crate::tools::types::{ExecutionResult, ExecutorStats, Tool, ToolOutput};
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Executes tools behind a bulkhead, per-tool circuit breakers, retries and timeouts
#[derive(Debug)]
pub struct ToolExecutor {
    /// Normalized configuration
    config: ExecutorConfig,

    /// Concurrency gate
    bulkhead: Bulkhead,

    /// Per-tool breakers
    breakers: CircuitBreakerRegistry,

    /// Retry decisions and backoff
    retry_policy: RetryPolicy,

    /// Per-attempt deadlines
    timeout_guard: TimeoutGuard,

    /// Call statistics
    stats: Mutex<ExecutorStats>,
}

/// Releases a half-open probe slot if the call ends before recording an outcome
struct ProbeGuard<'a> {
    breakers: &'a CircuitBreakerRegistry,
    tool: &'a str,
    armed: bool,
}

impl<'a> ProbeGuard<'a> {
    fn new(breakers: &'a CircuitBreakerRegistry, tool: &'a str, admission: Admission) -> Self {
        Self {
            breakers,
            tool,
            armed: admission == Admission::Probe,
        }
    }

    fn resolved(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breakers.abandon_probe(self.tool);
        }
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl ToolExecutor {
    /// Create an executor; non-positive settings are clamped
    pub fn new(config: ExecutorConfig) -> Self {
        let config = config.normalized();

        Self {
            bulkhead: Bulkhead::new(config.max_concurrent),
            breakers: CircuitBreakerRegistry::new(
                config.circuit_breaker_threshold,
                config.circuit_breaker_timeout,
            ),
            retry_policy: RetryPolicy::from_config(&config),
            timeout_guard: TimeoutGuard::new(config.default_timeout),
            stats: Mutex::new(ExecutorStats::default()),
            config,
        }
    }

    /// Create an executor from defaults plus overrides
    pub fn with_options(options: impl IntoIterator<Item = ConfigOption>) -> Self {
        Self::new(ExecutorConfig::from_options(options))
    }

    /// Execute one tool call
    ///
    /// Returns the output of the first successful attempt, or a single
    /// terminal error: an admission error, the caller's cancellation during
    /// backoff, or the last attempt error wrapped in `ExecutorError::Failed`.
    pub async fn execute(
        &self,
        ctx: &CallContext,
        tool: &dyn Tool,
        input: Value,
    ) -> Result<ExecutionResult> {
        let call_id = Uuid::new_v4();
        let name = tool.name();

        // Waits for a slot; released when `_permit` drops
        let _permit = self.bulkhead.acquire(ctx).await?;

        let admission = match self.breakers.check(name) {
            Ok(admission) => admission,
            Err(err) => {
                debug!(tool = name, %call_id, "rejected by open circuit");
                self.update_stats(|stats| stats.record_rejection());
                return Err(err);
            }
        };
        let mut probe = ProbeGuard::new(&self.breakers, name, admission);

        let max_attempts = self.retry_policy.max_attempts(tool);
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            let outcome = self.run_attempt(ctx, tool, &input).await;

            match outcome {
                Ok(output) => {
                    self.breakers.record_success(name);
                    probe.resolved();

                    let duration = started.elapsed();
                    self.update_stats(|stats| stats.record_success(attempt, duration));
                    debug!(
                        tool = name,
                        %call_id,
                        attempt,
                        duration_ms = duration.as_millis() as u64,
                        "tool call succeeded"
                    );

                    return Ok(ExecutionResult {
                        call_id,
                        tool: name.to_string(),
                        output,
                        duration,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    self.breakers.record_failure(name);
                    probe.resolved();
                    debug!(tool = name, %call_id, attempt, error = %err, "attempt failed");

                    let give_up = attempt >= max_attempts
                        || !self.retry_policy.is_retryable(&err)
                        || ctx.is_done();

                    if give_up {
                        let duration = started.elapsed();
                        self.update_stats(|stats| stats.record_failure(attempt, duration));
                        warn!(
                            tool = name,
                            %call_id,
                            attempts = attempt,
                            error = %err,
                            "tool call failed"
                        );

                        return Err(ExecutorError::Failed {
                            tool: name.to_string(),
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }

                    match self.retry_policy.backoff(ctx, attempt).await {
                        Ok(delay) => {
                            debug!(
                                tool = name,
                                %call_id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying"
                            );
                        }
                        Err(cancelled) => {
                            let duration = started.elapsed();
                            self.update_stats(|stats| stats.record_failure(attempt, duration));
                            debug!(tool = name, %call_id, attempt, "backoff interrupted");
                            return Err(cancelled);
                        }
                    }

                    attempt += 1;
                }
            }
        }
    }

    /// One attempt under a fresh per-attempt context
    async fn run_attempt(
        &self,
        ctx: &CallContext,
        tool: &dyn Tool,
        input: &Value,
    ) -> Result<ToolOutput> {
        // Child context is cancelled when `attempt` drops
        let attempt = self.timeout_guard.wrap(ctx);
        let attempt_ctx = attempt.context();

        let outcome = tokio::select! {
            result = tool.execute(attempt_ctx, input.clone()) => {
                result.map_err(|source| {
                    let err = ExecutorError::Tool {
                        tool: tool.name().to_string(),
                        source,
                    };

                    // Tool gave up because this attempt's context ended
                    if err.is_cancellation() && attempt_ctx.is_done() {
                        self.attempt_ended(ctx)
                    } else {
                        err
                    }
                })
            }
            _ = attempt_ctx.done() => Err(self.attempt_ended(ctx)),
        };

        debug!(
            tool = tool.name(),
            elapsed_ms = attempt.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "attempt finished"
        );
        outcome
    }

    /// Caller's own context wins over the per-attempt deadline
    fn attempt_ended(&self, ctx: &CallContext) -> ExecutorError {
        ctx.err().unwrap_or(ExecutorError::AttemptTimeout {
            timeout_ms: self.timeout_guard.timeout().as_millis() as u64,
        })
    }

    /// Execute several calls concurrently; results come back in input order
    pub async fn execute_all(
        &self,
        ctx: &CallContext,
        calls: Vec<(Arc<dyn Tool>, Value)>,
    ) -> Vec<Result<ExecutionResult>> {
        debug!(count = calls.len(), "dispatching tool calls");

        join_all(
            calls
                .into_iter()
                .map(|(tool, input)| async move { self.execute(ctx, tool.as_ref(), input).await }),
        )
        .await
    }

    /// Breakers recover on their own: an open breaker admits a probe once the
    /// cooldown has elapsed. There is no way to force-close one, so this does
    /// nothing.
    pub fn reset(&self) {}

    /// Current breaker state for a tool, if it has been called
    pub fn breaker_state(&self, tool: &str) -> Option<BreakerSnapshot> {
        self.breakers.snapshot(tool)
    }

    /// Snapshot of call statistics
    pub fn stats(&self) -> ExecutorStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Effective configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Concurrency gate
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// Breaker registry
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    fn update_stats(&self, update: impl FnOnce(&mut ExecutorStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }
}
