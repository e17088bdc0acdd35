//! Cancellable call context
//!
//! A `CallContext` pairs a cancellation token with an optional deadline.
//! Every blocking step of a tool call (bulkhead wait, attempt, backoff sleep)
//! races its own completion against `done()`.

use crate::errors::ExecutorError;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline, handed down to tools
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Cooperative cancellation signal
    token: CancellationToken,

    /// Absolute deadline, if any
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with no deadline that is only done when cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that is done once `timeout` has elapsed; a timeout too large
    /// to represent means no deadline
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::new().with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// Set an absolute deadline, keeping the earlier one if already set
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Child context: cancelled with the parent, same deadline
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Absolute deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline (zero once passed)
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the context is done, without waiting
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, or `None` while it is still live.
    /// Cancellation wins over an elapsed deadline.
    pub fn err(&self) -> Option<ExecutorError> {
        if self.token.is_cancelled() {
            return Some(ExecutorError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ExecutorError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ExecutorError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => ExecutorError::Cancelled,
                    _ = sleep_until(deadline) => ExecutorError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ExecutorError::Cancelled
            }
        }
    }

    /// Sleep for `duration` unless the context finishes first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ExecutorError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_live() {
        let ctx = CallContext::new();
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[tokio::test]
    async fn test_cancel_propagates_to_child() {
        let parent = CallContext::new();
        let child = parent.child();

        parent.cancel();

        assert!(matches!(child.err(), Some(ExecutorError::Cancelled)));
        assert!(matches!(child.done().await, ExecutorError::Cancelled));
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_touch_parent() {
        let parent = CallContext::new();
        let child = parent.child();

        child.cancel();

        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        let err = ctx.done().await;

        assert!(matches!(err, ExecutorError::DeadlineExceeded));
        assert!(matches!(ctx.err(), Some(ExecutorError::DeadlineExceeded)));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let ctx = CallContext::new()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(60));

        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_unrepresentable_timeout_means_no_deadline() {
        let ctx = CallContext::with_timeout(Duration::MAX);

        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_done());
    }

    #[test]
    fn test_external_cancel_token() {
        let token = CancellationToken::new();
        let ctx = CallContext::new().with_cancel_token(token.clone());

        token.cancel();

        assert!(matches!(ctx.err(), Some(ExecutorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = ctx.sleep(Duration::from_secs(10)).await;

        assert!(matches!(result, Err(ExecutorError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let ctx = CallContext::new();
        assert!(ctx.sleep(Duration::from_millis(5)).await.is_ok());
    }
}
