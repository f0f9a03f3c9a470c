// Orchestrator configuration
// Every threshold the scheduler, workers and breaker consult lives here so
// tuning never means a code change.

use std::time::Duration;

use crate::application::worker::constants::{
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};

/// Configuration for the query orchestration subsystem.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of concurrent workers. Each worker holds a full scraper
    /// session, and the anti-bot risk rises with request rate - keep small.
    pub pool_size: usize,

    /// Attempt ceiling before a job is permanently FAILED.
    pub max_attempts: i32,

    /// Base delay for exponential retry backoff.
    pub base_delay_ms: i64,

    /// Cap on the computed backoff delay.
    pub max_delay_ms: i64,

    /// Hard timeout applied to a single fetch attempt.
    pub fetch_timeout: Duration,

    /// How long a stored electoral record stays fresh before a lookup
    /// schedules a re-fetch.
    pub record_freshness_ms: i64,

    /// Priority given to single lookups.
    pub default_priority: i32,

    /// Priority given to bulk-submitted jobs (served after single lookups).
    pub bulk_priority: i32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            max_attempts: 3,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            fetch_timeout: Duration::from_secs(90),
            record_freshness_ms: 30 * 24 * 60 * 60 * 1000, // 30 days
            default_priority: 1,
            bulk_priority: 5,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures in CLOSED before the breaker opens.
    pub failure_threshold: u32,

    /// Time the breaker stays OPEN before admitting a half-open probe.
    pub cooldown_ms: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}
