//! Bulkhead: bounded concurrency gate
//!
//! Caps simultaneous tool executions across the whole executor.
//! - `acquire` waits for a slot or for the caller's context, whichever first
//! - Releasing is dropping the permit; it never blocks
//! - Fairness is whatever `tokio::sync::Semaphore` gives (FIFO)

use crate::errors::{ExecutorError, Result};
use crate::tools::context::CallContext;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore sized to `max_concurrent`
#[derive(Debug, Clone)]
pub struct Bulkhead {
    /// Slot accounting
    semaphore: Arc<Semaphore>,

    /// Total slots
    capacity: usize,
}

/// A held bulkhead slot, returned on drop
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl BulkheadPermit {
    /// Return the slot now
    pub fn release(self) {
        drop(self);
    }
}

impl Bulkhead {
    /// Create a bulkhead with `capacity` slots (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot, giving up when `ctx` is done
    pub async fn acquire(&self, ctx: &CallContext) -> Result<BulkheadPermit> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            permit = self.semaphore.clone().acquire_owned() => permit
                .map(|permit| BulkheadPermit { _permit: permit })
                .map_err(|_| ExecutorError::BulkheadClosed),
        }
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<BulkheadPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| BulkheadPermit { _permit: permit })
    }

    /// Total slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}
