// Lookup Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::record::ElectoralRecord;

/// Job ID (UUID v4)
pub type JobId = String;

/// Job State
///
/// QUEUED and RUNNING are the non-terminal states; at most one job per
/// document may occupy them at any time (enforced by the scheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "QUEUED"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Failure classification, mirroring the fetch collaborator's taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    NotFound,
    CaptchaFailed,
    Timeout,
    BrowserCrashed,
    NetworkError,
    /// The execution environment itself was broken; the document is not
    /// at fault and the attempt is not consumed.
    Environment,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::NotFound => write!(f, "NOT_FOUND"),
            FailureKind::CaptchaFailed => write!(f, "CAPTCHA_FAILED"),
            FailureKind::Timeout => write!(f, "TIMEOUT"),
            FailureKind::BrowserCrashed => write!(f, "BROWSER_CRASHED"),
            FailureKind::NetworkError => write!(f, "NETWORK_ERROR"),
            FailureKind::Environment => write!(f, "ENVIRONMENT"),
        }
    }
}

/// Last failure recorded on a job (cleared on success).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One scheduled lookup of a citizen's electoral registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupJob {
    pub id: JobId,
    pub document: String,
    /// Lower value is served first among QUEUED jobs of equal readiness.
    pub priority: i32,
    pub state: JobState,

    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<JobError>,
    /// Present only when state == Completed.
    pub result: Option<ElectoralRecord>,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Not eligible for dispatch before this time (retry backoff as data).
    /// Externally the job still reads as QUEUED.
    pub eligible_at: i64,
    /// Wall-clock duration of the last attempt.
    pub execution_time_ms: Option<i64>,
}

impl LookupJob {
    /// Create a new queued job.
    ///
    /// `id` and `created_at` are injected, not generated - production code
    /// goes through the IdProvider/TimeProvider ports.
    pub fn new(
        id: impl Into<String>,
        document: impl Into<String>,
        created_at: i64,
        priority: i32,
        max_attempts: i32,
    ) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            priority,
            state: JobState::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            result: None,
            created_at,
            started_at: None,
            completed_at: None,
            eligible_at: created_at,
            execution_time_ms: None,
        }
    }

    /// Transition QUEUED -> RUNNING. Consumes exactly one attempt.
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Queued {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "RUNNING".to_string(),
            });
        }
        self.state = JobState::Running;
        self.started_at = Some(now_millis);
        self.attempts += 1;
        Ok(())
    }

    /// Transition RUNNING -> COMPLETED with the fetched record.
    pub fn complete(&mut self, now_millis: i64, record: ElectoralRecord) -> Result<()> {
        if self.state != JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "COMPLETED".to_string(),
            });
        }
        self.execution_time_ms = self.started_at.map(|s| now_millis - s);
        self.state = JobState::Completed;
        self.completed_at = Some(now_millis);
        self.result = Some(record);
        self.last_error = None;
        Ok(())
    }

    /// Transition RUNNING -> FAILED (terminal, attempts exhausted).
    pub fn fail(&mut self, now_millis: i64, error: JobError) -> Result<()> {
        if self.state != JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "FAILED".to_string(),
            });
        }
        self.execution_time_ms = self.started_at.map(|s| now_millis - s);
        self.state = JobState::Failed;
        self.completed_at = Some(now_millis);
        self.last_error = Some(error);
        Ok(())
    }

    /// Transition RUNNING -> QUEUED for a retry, not dispatchable before
    /// `eligible_at`.
    pub fn requeue(
        &mut self,
        now_millis: i64,
        eligible_at: i64,
        error: Option<JobError>,
    ) -> Result<()> {
        if self.state != JobState::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "QUEUED".to_string(),
            });
        }
        self.execution_time_ms = self.started_at.map(|s| now_millis - s);
        self.state = JobState::Queued;
        self.started_at = None;
        self.eligible_at = eligible_at;
        if let Some(error) = error {
            self.last_error = Some(error);
        }
        Ok(())
    }

    /// Give the attempt back after an infrastructure fault. Only valid on a
    /// job that has consumed at least one attempt.
    pub fn refund_attempt(&mut self) {
        if self.attempts > 0 {
            self.attempts -= 1;
        }
    }

    /// Operator retry: FAILED -> QUEUED with attempts reset and the error
    /// cleared. Rejected for any other state.
    pub fn reset_for_retry(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Failed {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "QUEUED".to_string(),
            });
        }
        self.state = JobState::Queued;
        self.attempts = 0;
        self.last_error = None;
        self.started_at = None;
        self.completed_at = None;
        self.execution_time_ms = None;
        self.eligible_at = now_millis;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(document: &str) -> ElectoralRecord {
        ElectoralRecord {
            document: document.to_string(),
            full_name: None,
            department: "MAGDALENA".to_string(),
            municipality: "SANTA MARTA".to_string(),
            voting_place: "IE LICEO CELEDON".to_string(),
            table_number: "004".to_string(),
            address: None,
        }
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = LookupJob::new("j1", "1083432108", 1000, 0, 3);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.eligible_at, 1000);
        assert!(job.started_at.is_none());
        assert!(job.result.is_none());
    }

    #[test]
    fn test_start_consumes_one_attempt() {
        let mut job = LookupJob::new("j1", "1083432108", 1000, 0, 3);
        job.start(2000).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.started_at, Some(2000));

        // Cannot start a running job
        assert!(job.start(3000).is_err());
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn test_complete_clears_error_and_records_duration() {
        let mut job = LookupJob::new("j1", "1083432108", 1000, 0, 3);
        job.start(2000).unwrap();
        job.last_error = Some(JobError::new(FailureKind::Timeout, "earlier attempt"));
        job.complete(7000, sample_record("1083432108")).unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.execution_time_ms, Some(5000));
        assert_eq!(job.completed_at, Some(7000));
        assert!(job.last_error.is_none());
        assert!(job.result.is_some());
    }

    #[test]
    fn test_fail_is_terminal() {
        let mut job = LookupJob::new("j1", "1083432108", 1000, 0, 3);
        job.start(2000).unwrap();
        job.fail(3000, JobError::new(FailureKind::NotFound, "no registry row"))
            .unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert!(job.is_terminal());
        assert_eq!(job.last_error.as_ref().unwrap().kind, FailureKind::NotFound);
        // Terminal jobs cannot be completed
        assert!(job.complete(4000, sample_record("1083432108")).is_err());
    }

    #[test]
    fn test_requeue_keeps_attempts_and_sets_backoff() {
        let mut job = LookupJob::new("j1", "1083432108", 1000, 0, 3);
        job.start(2000).unwrap();
        job.requeue(
            3000,
            5000,
            Some(JobError::new(FailureKind::NetworkError, "connection reset")),
        )
        .unwrap();

        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.eligible_at, 5000);
        assert!(job.started_at.is_none());
        assert_eq!(job.execution_time_ms, Some(1000));
    }

    #[test]
    fn test_refund_attempt_after_environment_fault() {
        let mut job = LookupJob::new("j1", "1083432108", 1000, 0, 3);
        job.start(2000).unwrap();
        job.refund_attempt();
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_reset_for_retry_only_from_failed() {
        let mut job = LookupJob::new("j1", "1083432108", 1000, 0, 3);
        assert!(job.reset_for_retry(2000).is_err());

        job.start(2000).unwrap();
        job.fail(3000, JobError::new(FailureKind::Timeout, "timed out"))
            .unwrap();
        job.reset_for_retry(4000).unwrap();

        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.last_error.is_none());
        assert_eq!(job.eligible_at, 4000);
    }

    #[test]
    fn test_job_serialization() {
        let mut job = LookupJob::new("j1", "1083432108", 1000, 2, 3);
        job.start(2000).unwrap();
        job.complete(3000, sample_record("1083432108")).unwrap();

        let json = serde_json::to_string(&job).expect("serialize");
        let deserialized: LookupJob = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(job.id, deserialized.id);
        assert_eq!(job.state, deserialized.state);
        assert_eq!(job.result, deserialized.result);
    }
}
