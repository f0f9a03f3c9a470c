// Worker constants (no magic values in the loop body)
use std::time::Duration;

/// Sleep while the queue is empty, the pool is paused or the breaker is
/// holding dispatch back.
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(500);

/// Sleep after a worker-level error before the loop resumes.
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Grace delay before a job hit by an infrastructure fault becomes
/// eligible again. The attempt is refunded, so this only spaces retries.
pub const INFRA_REQUEUE_DELAY_MS: i64 = 2_000;

/// Default retry base delay (5s) - the external site punishes fast retries.
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 5_000;

/// Default cap on the computed backoff delay (5 minutes).
pub const DEFAULT_RETRY_MAX_DELAY_MS: i64 = 5 * 60_000;
