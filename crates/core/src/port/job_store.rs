// Job Store Port (Interface)

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{JobId, JobState, LookupJob};
use crate::error::Result;

/// Counts by state, taken as a snapshot without blocking dispatch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobCounts {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

impl JobCounts {
    pub fn total(&self) -> i64 {
        self.queued + self.running + self.completed + self.failed
    }
}

/// Repository interface for lookup jobs.
///
/// `claim_next` must be atomic: among QUEUED jobs with `eligible_at <= now`,
/// the one with the lowest priority value wins, ties broken by oldest
/// `created_at` then id; the returned job has already transitioned to
/// RUNNING with the attempt consumed. Two concurrent callers can never
/// claim the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &LookupJob) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &JobId) -> Result<Option<LookupJob>>;

    /// Update job
    async fn update(&self, job: &LookupJob) -> Result<()>;

    /// Find the non-terminal (QUEUED/RUNNING) job for a document, if any
    async fn find_active_by_document(&self, document: &str) -> Result<Option<LookupJob>>;

    /// Id of the job `claim_next` would return, without claiming it
    async fn peek_next(&self, now_millis: i64) -> Result<Option<JobId>>;

    /// Atomically claim the next eligible job (QUEUED -> RUNNING)
    async fn claim_next(&self, now_millis: i64) -> Result<Option<LookupJob>>;

    /// Snapshot of counts by state
    async fn counts(&self) -> Result<JobCounts>;

    /// All jobs in a given state, oldest first
    async fn find_by_state(&self, state: JobState) -> Result<Vec<LookupJob>>;

    /// All jobs (any state) whose document is in the given set, oldest first
    async fn find_by_documents(&self, documents: &[String]) -> Result<Vec<LookupJob>>;

    /// Delete a job by id. Returns false if it did not exist.
    async fn delete(&self, id: &JobId) -> Result<bool>;

    /// Delete every job in a given state, returning how many went away
    async fn delete_by_state(&self, state: JobState) -> Result<u64>;

    /// Delete terminal jobs whose `completed_at` is before the cutoff
    async fn purge_terminal_older_than(&self, cutoff_millis: i64) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory job store with the same claim semantics as the SQLite
    /// adapter. Good enough for every core unit test.
    pub struct InMemoryJobStore {
        jobs: Mutex<HashMap<JobId, LookupJob>>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self {
                jobs: Mutex::new(HashMap::new()),
            }
        }

        fn next_eligible_id(jobs: &HashMap<JobId, LookupJob>, now_millis: i64) -> Option<JobId> {
            jobs.values()
                .filter(|j| j.state == JobState::Queued && j.eligible_at <= now_millis)
                .min_by(|a, b| {
                    a.priority
                        .cmp(&b.priority)
                        .then(a.created_at.cmp(&b.created_at))
                        .then(a.id.cmp(&b.id))
                })
                .map(|j| j.id.clone())
        }
    }

    impl Default for InMemoryJobStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn insert(&self, job: &LookupJob) -> Result<()> {
            self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<LookupJob>> {
            Ok(self.jobs.lock().unwrap().get(id).cloned())
        }

        async fn update(&self, job: &LookupJob) -> Result<()> {
            self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_active_by_document(&self, document: &str) -> Result<Option<LookupJob>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .find(|j| j.document == document && !j.is_terminal())
                .cloned())
        }

        async fn peek_next(&self, now_millis: i64) -> Result<Option<JobId>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(Self::next_eligible_id(&jobs, now_millis))
        }

        async fn claim_next(&self, now_millis: i64) -> Result<Option<LookupJob>> {
            let mut jobs = self.jobs.lock().unwrap();
            let id = match Self::next_eligible_id(&jobs, now_millis) {
                Some(id) => id,
                None => return Ok(None),
            };
            let job = jobs.get_mut(&id).expect("job vanished under lock");
            job.start(now_millis)
                .map_err(crate::error::AppError::Domain)?;
            Ok(Some(job.clone()))
        }

        async fn counts(&self) -> Result<JobCounts> {
            let jobs = self.jobs.lock().unwrap();
            let mut counts = JobCounts::default();
            for job in jobs.values() {
                match job.state {
                    JobState::Queued => counts.queued += 1,
                    JobState::Running => counts.running += 1,
                    JobState::Completed => counts.completed += 1,
                    JobState::Failed => counts.failed += 1,
                }
            }
            Ok(counts)
        }

        async fn find_by_state(&self, state: JobState) -> Result<Vec<LookupJob>> {
            let jobs = self.jobs.lock().unwrap();
            let mut found: Vec<LookupJob> =
                jobs.values().filter(|j| j.state == state).cloned().collect();
            found.sort_by_key(|j| (j.created_at, j.id.clone()));
            Ok(found)
        }

        async fn find_by_documents(&self, documents: &[String]) -> Result<Vec<LookupJob>> {
            let jobs = self.jobs.lock().unwrap();
            let mut found: Vec<LookupJob> = jobs
                .values()
                .filter(|j| documents.contains(&j.document))
                .cloned()
                .collect();
            found.sort_by_key(|j| (j.created_at, j.id.clone()));
            Ok(found)
        }

        async fn delete(&self, id: &JobId) -> Result<bool> {
            Ok(self.jobs.lock().unwrap().remove(id).is_some())
        }

        async fn delete_by_state(&self, state: JobState) -> Result<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|_, j| j.state != state);
            Ok((before - jobs.len()) as u64)
        }

        async fn purge_terminal_older_than(&self, cutoff_millis: i64) -> Result<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|_, j| {
                !(j.is_terminal() && j.completed_at.map(|t| t < cutoff_millis).unwrap_or(false))
            });
            Ok((before - jobs.len()) as u64)
        }
    }
}
