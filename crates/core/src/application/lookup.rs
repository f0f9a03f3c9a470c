// Lookup Service - the single-document inbound path
//
// Serves from the record store when the cached data is fresh; otherwise
// schedules a job and hands back an id for the client's polling loop.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::application::scheduler::QueueScheduler;
use crate::domain::{
    normalize_document, validate_document, DomainError, ElectoralRecord, JobError, JobId,
    JobState,
};
use crate::error::{AppError, Result};
use crate::port::{JobStore, RecordStore, TimeProvider};

/// Outcome of a single lookup submission.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// A sufficiently fresh record already exists; no job was created.
    Fresh(ElectoralRecord),
    /// A new job was scheduled; poll `job_status` with its id.
    Scheduled { job_id: JobId },
    /// The document already has a queued/running job; observe that one.
    AlreadyInFlight { job_id: JobId },
}

/// Polling payload for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error: Option<JobError>,
    pub result: Option<ElectoralRecord>,
    pub execution_time_ms: Option<i64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

pub struct LookupService {
    scheduler: Arc<QueueScheduler>,
    record_store: Arc<dyn RecordStore>,
    job_store: Arc<dyn JobStore>,
    clock: Arc<dyn TimeProvider>,
    record_freshness_ms: i64,
    default_priority: i32,
}

impl LookupService {
    pub fn new(
        scheduler: Arc<QueueScheduler>,
        record_store: Arc<dyn RecordStore>,
        job_store: Arc<dyn JobStore>,
        clock: Arc<dyn TimeProvider>,
        record_freshness_ms: i64,
        default_priority: i32,
    ) -> Self {
        Self {
            scheduler,
            record_store,
            job_store,
            clock,
            record_freshness_ms,
            default_priority,
        }
    }

    /// Resolve a document to a fresh record or a job to poll.
    pub async fn submit_lookup(&self, raw_document: &str) -> Result<LookupOutcome> {
        let document = normalize_document(raw_document);
        validate_document(&document).map_err(AppError::Domain)?;

        let now = self.clock.now_millis();
        if let Some(citizen) = self.record_store.find(&document).await? {
            if citizen.is_fresh(now, self.record_freshness_ms) {
                debug!(document = %document, "Lookup served from record store");
                // is_fresh guarantees electoral data is present
                if let Some(record) = citizen.electoral {
                    return Ok(LookupOutcome::Fresh(record));
                }
            }
        }

        match self
            .scheduler
            .enqueue(&document, self.default_priority)
            .await
        {
            Ok(job_id) => Ok(LookupOutcome::Scheduled { job_id }),
            Err(AppError::Domain(DomainError::DuplicateInFlight(_))) => {
                let existing = self
                    .job_store
                    .find_active_by_document(&document)
                    .await?
                    .ok_or_else(|| {
                        // The in-flight job resolved between the enqueue
                        // attempt and this read; tell the client to retry.
                        AppError::Conflict(format!(
                            "Lookup for {} just resolved, submit again",
                            document
                        ))
                    })?;
                Ok(LookupOutcome::AlreadyInFlight {
                    job_id: existing.id,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Snapshot of a job for the polling contract.
    pub async fn job_status(&self, job_id: &JobId) -> Result<JobStatus> {
        let job = self
            .job_store
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

        Ok(JobStatus {
            job_id: job.id,
            state: job.state,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            error: job.last_error,
            result: job.result,
            execution_time_ms: job.execution_time_ms,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        })
    }
}
