//! Circuit breaker registry
//!
//! One breaker per tool name, created on first reference and kept for the
//! life of the registry. Each breaker has its own lock; the registry map lock
//! is only held to look up or insert an entry, so a failing tool never
//! blocks admission of unrelated tools.
//!
//! # State machine
//!
//! ```text
//! 1. Closed   → Open     (on: `threshold` consecutive failures)
//! 2. Open     → Open     (on: check before cooldown elapsed, rejected)
//! 3. Open     → HalfOpen (on: check after cooldown, caller becomes the probe)
//! 4. HalfOpen → HalfOpen (on: check while probe in flight, rejected)
//! 5. HalfOpen → Closed   (on: probe success)
//! 6. HalfOpen → Open     (on: probe failure, cooldown restarts)
//! 7. *        → Closed   (on: any recorded success)
//! ```

use crate::errors::{ExecutorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerPhase {
    /// Calls flow normally
    Closed,

    /// Calls fail fast until the cooldown elapses
    Open,

    /// A single probe call is testing recovery
    HalfOpen,
}

/// How a call was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed, normal call
    Normal,

    /// This call is the half-open probe
    Probe,
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current phase
    pub phase: BreakerPhase,

    /// Failures since the last success
    pub consecutive_failures: u32,

    /// When the breaker last opened
    pub opened_at: Option<Instant>,

    /// Whether a half-open probe is outstanding
    pub probe_in_flight: bool,
}

#[derive(Debug)]
struct BreakerState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn open(&mut self, now: Instant) {
        self.phase = BreakerPhase::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            phase: self.phase,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
            probe_in_flight: self.probe_in_flight,
        }
    }
}

/// Per-tool circuit breakers
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    /// Consecutive failures before opening
    threshold: u32,

    /// Open-state cooldown
    cooldown: Duration,

    /// Tool name → breaker; each entry carries its own lock
    breakers: Mutex<HashMap<String, Arc<Mutex<BreakerState>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CircuitBreakerRegistry {
    /// Create a registry; `threshold` is clamped to at least 1
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn breaker(&self, tool: &str) -> Arc<Mutex<BreakerState>> {
        let mut breakers = lock(&self.breakers);
        if let Some(existing) = breakers.get(tool) {
            return Arc::clone(existing);
        }
        let created = Arc::new(Mutex::new(BreakerState::new()));
        breakers.insert(tool.to_string(), Arc::clone(&created));
        created
    }

    /// Decide whether a call to `tool` may proceed
    pub fn check(&self, tool: &str) -> Result<Admission> {
        self.check_at(tool, Instant::now())
    }

    pub(crate) fn check_at(&self, tool: &str, now: Instant) -> Result<Admission> {
        let breaker = self.breaker(tool);
        let mut state = lock(&breaker);

        match state.phase {
            BreakerPhase::Closed => Ok(Admission::Normal),
            BreakerPhase::Open => {
                let cooled_down = state.opened_at.map_or(true, |opened_at| {
                    now.saturating_duration_since(opened_at) >= self.cooldown
                });

                if !cooled_down {
                    return Err(ExecutorError::CircuitOpen {
                        tool: tool.to_string(),
                    });
                }

                state.phase = BreakerPhase::HalfOpen;
                state.consecutive_failures = 0;
                state.probe_in_flight = true;
                debug!(tool, "circuit half-open, admitting probe");
                Ok(Admission::Probe)
            }
            BreakerPhase::HalfOpen => {
                if state.probe_in_flight {
                    return Err(ExecutorError::CircuitOpen {
                        tool: tool.to_string(),
                    });
                }

                // Previous probe was abandoned without an outcome
                state.probe_in_flight = true;
                debug!(tool, "circuit half-open, admitting replacement probe");
                Ok(Admission::Probe)
            }
        }
    }

    /// Record a successful attempt: close and reset
    pub fn record_success(&self, tool: &str) {
        let breaker = self.breaker(tool);
        let mut state = lock(&breaker);

        if state.phase != BreakerPhase::Closed {
            info!(tool, "circuit closed");
        }
        state.phase = BreakerPhase::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.probe_in_flight = false;
    }

    /// Record a failed attempt
    pub fn record_failure(&self, tool: &str) {
        self.record_failure_at(tool, Instant::now());
    }

    pub(crate) fn record_failure_at(&self, tool: &str, now: Instant) {
        let breaker = self.breaker(tool);
        let mut state = lock(&breaker);

        match state.phase {
            BreakerPhase::HalfOpen => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.open(now);
                warn!(tool, "probe failed, circuit reopened");
            }
            BreakerPhase::Closed => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                if state.consecutive_failures >= self.threshold {
                    state.open(now);
                    warn!(
                        tool,
                        failures = state.consecutive_failures,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "circuit opened"
                    );
                }
            }
            BreakerPhase::Open => {
                // Attempt admitted before the breaker opened; cooldown keeps running
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            }
        }
    }

    /// Release a probe slot whose call ended without an outcome
    pub(crate) fn abandon_probe(&self, tool: &str) {
        let breaker = self.breaker(tool);
        let mut state = lock(&breaker);

        if state.phase == BreakerPhase::HalfOpen && state.probe_in_flight {
            state.probe_in_flight = false;
            debug!(tool, "probe abandoned");
        }
    }

    /// Current state of a tool's breaker, if it has been referenced
    pub fn snapshot(&self, tool: &str) -> Option<BreakerSnapshot> {
        let breaker = lock(&self.breakers).get(tool).cloned()?;
        let state = lock(&breaker);
        Some(state.snapshot())
    }

    /// Tool names with a breaker
    pub fn tool_names(&self) -> Vec<String> {
        lock(&self.breakers).keys().cloned().collect()
    }

    /// Number of breakers
    pub fn len(&self) -> usize {
        lock(&self.breakers).len()
    }

    /// Whether no breaker has been created yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Failure threshold
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Open-state cooldown
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
