//! SDK wire types
//!
//! Mirrors the daemon's JSON-RPC responses. Kept independent of the server
//! crates so the SDK can version separately.

use serde::Deserialize;

/// Electoral assignment data for a document.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectoralRecord {
    pub document: String,
    pub full_name: Option<String>,
    pub department: String,
    pub municipality: String,
    pub voting_place: String,
    pub table_number: String,
    pub address: Option<String>,
}

/// Last failure recorded on a job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobErrorInfo {
    pub kind: String,
    pub message: String,
}

/// lookup.submit.v1 response
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitLookupResponse {
    pub document: String,
    pub record: Option<ElectoralRecord>,
    pub job_id: Option<String>,
    pub already_in_flight: bool,
}

/// lookup.status.v1 response
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error: Option<JobErrorInfo>,
    pub result: Option<ElectoralRecord>,
    pub execution_time_ms: Option<i64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        self.state == "COMPLETED" || self.state == "FAILED"
    }
}

/// One rejected batch row.
#[derive(Debug, Clone, Deserialize)]
pub struct RowFailure {
    pub row: usize,
    pub document: String,
    pub reason: String,
}

/// bulk.submit.v1 / bulk.refresh.v1 response
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResult {
    pub total: u64,
    pub found_in_store: u64,
    pub enqueued: u64,
    pub in_flight: u64,
    pub errors: u64,
    pub failures: Vec<RowFailure>,
}

/// queue.stats.v1 response
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}
