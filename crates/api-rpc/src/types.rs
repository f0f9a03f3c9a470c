//! RPC Request/Response Types
//!
//! Core result types that are already response-shaped (JobStatus, BulkResult,
//! QueueStats, WorkerStats, BreakerStats, RowOutcome) are returned directly;
//! this module defines the request envelopes and the thin responses.

use padron_core::domain::ElectoralRecord;
use serde::{Deserialize, Serialize};

/// lookup.submit.v1 - Resolve a document to a record or a job
#[derive(Debug, Deserialize)]
pub struct SubmitLookupRequest {
    pub document: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitLookupResponse {
    pub document: String,
    /// Present when the record store already held fresh data.
    pub record: Option<ElectoralRecord>,
    /// Present when a job must be polled instead.
    pub job_id: Option<String>,
    /// True when the job id belongs to a lookup that was already in flight.
    pub already_in_flight: bool,
}

/// lookup.status.v1 - Poll a job
#[derive(Debug, Deserialize)]
pub struct JobStatusRequest {
    pub job_id: String,
}

/// bulk.submit.v1 - Submit a batch of documents
#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    pub documents: Vec<String>,
}

/// bulk.refresh.v1 - Re-fetch everything in the record store
#[derive(Debug, Deserialize)]
pub struct RefreshAllRequest {}

/// bulk.report.v1 - Reconcile final outcomes for a document set
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub documents: Vec<String>,
}

/// workers.pause.v1 / workers.resume.v1
#[derive(Debug, Deserialize)]
pub struct ControlRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub paused: bool,
}

/// job.retry.v1 - Reset a failed job
#[derive(Debug, Deserialize)]
pub struct RetryJobRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryJobResponse {
    pub job_id: String,
    pub state: String,
}

/// job.delete.v1 - Delete a queued/failed job
#[derive(Debug, Deserialize)]
pub struct DeleteJobRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteJobResponse {
    pub job_id: String,
    pub deleted: bool,
}

/// jobs.retryFailed.v1 / jobs.deleteFailed.v1 / admin.purge.v1
#[derive(Debug, Clone, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// admin.purge.v1 - Remove terminal jobs older than N days
#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    #[serde(default = "default_purge_days")]
    pub days: i64,
}

fn default_purge_days() -> i64 {
    7
}

/// queue.stats.v1 / workers.stats.v1 / breaker.stats.v1 / admin.stats.v1
#[derive(Debug, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct AdminStatsResponse {
    pub total_jobs: i64,
    pub queued_jobs: i64,
    pub running_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub citizen_count: i64,
    pub db_size_bytes: i64,
    pub uptime_seconds: i64,
}
