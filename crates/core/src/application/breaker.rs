// Circuit breaker over the external fetch capability
//
// One instance per process, constructed at startup and passed by Arc to the
// scheduler and every worker. All state lives behind a single mutex so the
// half-open probe admission can never race.

use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use crate::application::config::BreakerConfig;
use crate::port::TimeProvider;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Snapshot for the stats surface
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub opened_at: Option<i64>,
}

struct BreakerInner {
    state: BreakerState,
    /// Consecutive failures since the last success or state change.
    failure_count: u32,
    /// Successes since the last state change.
    success_count: u32,
    opened_at: Option<i64>,
    /// Set while the single HALF_OPEN probe is in flight.
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn TimeProvider>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Ask permission to call the external source.
    ///
    /// CLOSED: always granted. OPEN: denied until the cooldown has elapsed,
    /// at which point the breaker moves to HALF_OPEN and grants exactly one
    /// probe. HALF_OPEN: denied while the probe is unresolved.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let now = self.clock.now_millis();
                let opened_at = inner.opened_at.unwrap_or(now);
                if now - opened_at >= self.config.cooldown_ms {
                    info!(cooldown_ms = self.config.cooldown_ms, "Circuit breaker half-open, admitting trial request");
                    inner.state = BreakerState::HalfOpen;
                    inner.success_count = 0;
                    inner.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record the outcome of a fetch the breaker permitted.
    pub fn record_result(&self, success: bool) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                if success {
                    inner.failure_count = 0;
                    inner.success_count += 1;
                } else {
                    inner.failure_count += 1;
                    if inner.failure_count >= self.config.failure_threshold {
                        let now = self.clock.now_millis();
                        warn!(
                            failures = inner.failure_count,
                            "Circuit breaker opened after consecutive failures"
                        );
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(now);
                        inner.success_count = 0;
                    }
                }
            }
            BreakerState::HalfOpen => {
                inner.trial_in_flight = false;
                if success {
                    info!("Circuit breaker trial succeeded, closing");
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                } else {
                    let now = self.clock.now_millis();
                    warn!("Circuit breaker trial failed, reopening");
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    inner.failure_count += 1;
                }
            }
            // Late results from calls admitted before the breaker opened;
            // count them but leave the state machine alone.
            BreakerState::Open => {
                if success {
                    inner.success_count += 1;
                } else {
                    inner.failure_count += 1;
                }
            }
        }
    }

    /// Non-consuming view of the state; the scheduler uses allow_request
    /// instead so the half-open probe is accounted for.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock().unwrap();
        BreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            opened_at: inner.opened_at,
        }
    }
}
