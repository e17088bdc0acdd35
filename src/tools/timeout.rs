//! Per-attempt timeout guard
//!
//! Each attempt runs under a fresh child of the caller's context whose
//! deadline is `min(caller deadline, now + timeout)`. The child is cancelled
//! when the `AttemptContext` drops, whatever the outcome, so a timed-out
//! attempt never leaks into the next one.

use crate::tools::context::CallContext;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::DropGuard;

/// Derives bounded-lifetime contexts for individual attempts
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    /// Per-attempt deadline
    timeout: Duration,
}

/// Context for one attempt; cancels itself on drop
#[derive(Debug)]
pub struct AttemptContext {
    /// Child context handed to the tool
    ctx: CallContext,

    /// Attempt start
    started: Instant,

    /// Cancels `ctx` when this value goes away
    _cancel_on_drop: DropGuard,
}

impl TimeoutGuard {
    /// Create a guard with the given per-attempt timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Derive an attempt context from the caller's context
    pub fn wrap(&self, parent: &CallContext) -> AttemptContext {
        let started = Instant::now();
        let ctx = match started.checked_add(self.timeout) {
            Some(deadline) => parent.child().with_deadline(deadline),
            // Too far out to represent; only the caller's deadline applies
            None => parent.child(),
        };
        let cancel_on_drop = ctx.token().clone().drop_guard();

        AttemptContext {
            ctx,
            started,
            _cancel_on_drop: cancel_on_drop,
        }
    }
}

impl AttemptContext {
    /// Context to pass to the tool
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// Effective deadline of this attempt
    pub fn deadline(&self) -> Option<Instant> {
        self.ctx.deadline()
    }

    /// Time since the attempt started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Release the attempt context early
    pub fn cancel(self) {
        drop(self);
    }
}
