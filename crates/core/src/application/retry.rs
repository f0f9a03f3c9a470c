// Retry backoff policy

use tracing::{info, warn};

use crate::domain::LookupJob;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job after the given backoff delay in ms
    Retry(i64),
    /// Attempt budget spent, the job fails permanently
    Exhausted,
}

/// Exponential backoff policy.
///
/// delay = base_delay * 2^(attempts - 1), capped at max_delay, with a
/// deterministic ±10% jitter seeded by the job id so retries of a burst of
/// jobs do not land on the external site simultaneously.
pub struct RetryPolicy {
    base_delay_ms: i64,
    max_delay_ms: i64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: i64, max_delay_ms: i64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Decide whether a just-failed job gets another attempt.
    ///
    /// Called after the failed attempt has been counted, so `attempts >= 1`.
    pub fn should_retry(&self, job: &LookupJob) -> RetryDecision {
        if job.attempts >= job.max_attempts {
            warn!(
                job_id = %job.id,
                document = %job.document,
                attempts = %job.attempts,
                max_attempts = %job.max_attempts,
                "Max attempts reached"
            );
            return RetryDecision::Exhausted;
        }

        let exponent = (job.attempts - 1).max(0).min(20) as u32;
        let raw_delay = self
            .base_delay_ms
            .saturating_mul(1_i64 << exponent)
            .min(self.max_delay_ms);

        // Deterministic jitter per job id, 0.9 to 1.1
        let jitter_seed = job.id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0);
        let delay_ms = ((raw_delay as f64 * jitter_factor) as i64).min(self.max_delay_ms);

        info!(
            job_id = %job.id,
            attempt = %job.attempts,
            max_attempts = %job.max_attempts,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LookupJob;

    fn job_with_attempts(attempts: i32, max_attempts: i32) -> LookupJob {
        let mut job = LookupJob::new("jitterless", "1083432108", 1000, 0, max_attempts);
        job.attempts = attempts;
        job
    }

    #[test]
    fn test_exhausted_at_max_attempts() {
        let policy = RetryPolicy::new(1000, 60_000);
        assert_eq!(
            policy.should_retry(&job_with_attempts(3, 3)),
            RetryDecision::Exhausted
        );
        assert_eq!(
            policy.should_retry(&job_with_attempts(4, 3)),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(1000, 60_000);

        let d1 = match policy.should_retry(&job_with_attempts(1, 5)) {
            RetryDecision::Retry(d) => d,
            _ => panic!("expected retry"),
        };
        let d2 = match policy.should_retry(&job_with_attempts(2, 5)) {
            RetryDecision::Retry(d) => d,
            _ => panic!("expected retry"),
        };
        let d3 = match policy.should_retry(&job_with_attempts(3, 5)) {
            RetryDecision::Retry(d) => d,
            _ => panic!("expected retry"),
        };

        // Jitter is deterministic per id, so ratios are exact
        assert_eq!(d2, d1 * 2);
        assert_eq!(d3, d1 * 4);
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy::new(1000, 3000);
        match policy.should_retry(&job_with_attempts(10, 20)) {
            RetryDecision::Retry(d) => assert!(d <= 3000),
            _ => panic!("expected retry"),
        }
    }

    #[test]
    fn test_jitter_deterministic_per_job() {
        let policy = RetryPolicy::new(1000, 60_000);
        let job = job_with_attempts(1, 5);
        let a = policy.should_retry(&job);
        let b = policy.should_retry(&job);
        assert_eq!(a, b);
    }
}
