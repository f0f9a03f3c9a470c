// Bulk Orchestrator - expands a batch of documents into the minimal set of
// new jobs and reconciles outcomes into a report.
//
// Submission is fire-and-forget: the caller gets an immediate summary and
// observes progress through the queue stats. Nothing here blocks on a fetch.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::application::scheduler::QueueScheduler;
use crate::domain::{
    normalize_document, validate_document, DomainError, ElectoralRecord, JobError, JobState,
    LookupJob,
};
use crate::error::{AppError, Result};
use crate::port::{JobStore, RecordStore, TimeProvider};

/// One rejected input row, kept for operator inspection/export.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    /// Zero-based index of the row in the submitted batch.
    pub row: usize,
    pub document: String,
    pub reason: String,
}

/// Aggregate outcome of one batch submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkResult {
    pub total: u64,
    /// Rows satisfied by a fresh record already in the store.
    pub found_in_store: u64,
    /// Rows for which a new job was created.
    pub enqueued: u64,
    /// Rows whose document already had a queued/running job (including
    /// duplicates inside the batch itself). Not an error; no new job.
    pub in_flight: u64,
    pub errors: u64,
    pub failures: Vec<RowFailure>,
}

/// Final per-row outcome, reconciled after jobs have drained.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub row: usize,
    pub document: String,
    /// None when no job was ever created for the document.
    pub state: Option<JobState>,
    pub attempts: Option<i32>,
    pub error: Option<JobError>,
    pub result: Option<ElectoralRecord>,
}

pub struct BulkOrchestrator {
    scheduler: Arc<QueueScheduler>,
    record_store: Arc<dyn RecordStore>,
    job_store: Arc<dyn JobStore>,
    clock: Arc<dyn TimeProvider>,
    record_freshness_ms: i64,
    bulk_priority: i32,
}

impl BulkOrchestrator {
    pub fn new(
        scheduler: Arc<QueueScheduler>,
        record_store: Arc<dyn RecordStore>,
        job_store: Arc<dyn JobStore>,
        clock: Arc<dyn TimeProvider>,
        record_freshness_ms: i64,
        bulk_priority: i32,
    ) -> Self {
        Self {
            scheduler,
            record_store,
            job_store,
            clock,
            record_freshness_ms,
            bulk_priority,
        }
    }

    /// Reconcile a batch against the record store and enqueue only what is
    /// missing or stale.
    pub async fn submit_batch(&self, documents: &[String]) -> Result<BulkResult> {
        self.submit(documents, false).await
    }

    /// Re-fetch every document known to the record store, regardless of
    /// freshness. Rare and heavy; the summary returns immediately while the
    /// jobs drain asynchronously.
    pub async fn refresh_all(&self) -> Result<BulkResult> {
        let documents = self.record_store.all_documents().await?;
        info!(documents = documents.len(), "Refresh-all requested");
        self.submit(&documents, true).await
    }

    async fn submit(&self, documents: &[String], force: bool) -> Result<BulkResult> {
        let now = self.clock.now_millis();
        let mut result = BulkResult {
            total: documents.len() as u64,
            ..BulkResult::default()
        };

        for (row, raw) in documents.iter().enumerate() {
            let document = normalize_document(raw);
            if let Err(e) = validate_document(&document) {
                result.errors += 1;
                result.failures.push(RowFailure {
                    row,
                    document: raw.clone(),
                    reason: e.to_string(),
                });
                continue;
            }

            if !force {
                if let Some(citizen) = self.record_store.find(&document).await? {
                    if citizen.is_fresh(now, self.record_freshness_ms) {
                        result.found_in_store += 1;
                        continue;
                    }
                }
            }

            match self.scheduler.enqueue(&document, self.bulk_priority).await {
                Ok(_) => result.enqueued += 1,
                Err(AppError::Domain(DomainError::DuplicateInFlight(_))) => {
                    result.in_flight += 1;
                }
                Err(e) => {
                    result.errors += 1;
                    result.failures.push(RowFailure {
                        row,
                        document: raw.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            total = result.total,
            found_in_store = result.found_in_store,
            enqueued = result.enqueued,
            in_flight = result.in_flight,
            errors = result.errors,
            "Batch submission reconciled"
        );
        Ok(result)
    }

    /// Per-row final outcomes for a previously submitted document set.
    pub async fn build_report(&self, documents: &[String]) -> Result<Vec<RowOutcome>> {
        let normalized: Vec<String> = documents.iter().map(|d| normalize_document(d)).collect();
        let jobs = self.job_store.find_by_documents(&normalized).await?;
        Ok(reconcile(&normalized, &jobs))
    }
}

/// Pure reconciliation of input rows against their jobs. The most recent
/// job per document wins (a document may have been re-queried).
fn reconcile(documents: &[String], jobs: &[LookupJob]) -> Vec<RowOutcome> {
    documents
        .iter()
        .enumerate()
        .map(|(row, document)| {
            let latest = jobs
                .iter()
                .filter(|j| &j.document == document)
                .max_by_key(|j| (j.created_at, j.id.clone()));
            match latest {
                Some(job) => RowOutcome {
                    row,
                    document: document.clone(),
                    state: Some(job.state),
                    attempts: Some(job.attempts),
                    error: job.last_error.clone(),
                    result: job.result.clone(),
                },
                None => RowOutcome {
                    row,
                    document: document.clone(),
                    state: None,
                    attempts: None,
                    error: None,
                    result: None,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::breaker::CircuitBreaker;
    use crate::application::config::BreakerConfig;
    use crate::port::fetcher::mocks::sample_record;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::record_store::mocks::InMemoryRecordStore;
    use crate::port::time_provider::mocks::MockClock;

    struct Rig {
        orchestrator: BulkOrchestrator,
        scheduler: Arc<QueueScheduler>,
        record_store: Arc<InMemoryRecordStore>,
    }

    fn rig() -> Rig {
        let clock = Arc::new(MockClock::new(1_000_000));
        let job_store = Arc::new(InMemoryJobStore::new());
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default(), clock.clone()));
        let scheduler = Arc::new(QueueScheduler::new(
            job_store.clone(),
            breaker,
            Arc::new(SequentialIdProvider::new()),
            clock.clone(),
            3,
        ));
        let record_store = Arc::new(InMemoryRecordStore::new());
        let orchestrator = BulkOrchestrator::new(
            scheduler.clone(),
            record_store.clone(),
            job_store.clone(),
            clock,
            60_000,
            5,
        );
        Rig {
            orchestrator,
            scheduler,
            record_store,
        }
    }

    #[tokio::test]
    async fn test_batch_reconciliation_scenario() {
        let rig = rig();

        // 2 documents already fresh in the store
        rig.record_store.seed(sample_record("1000000001"), 999_000);
        rig.record_store.seed(sample_record("1000000002"), 999_000);

        // 1 document with a lookup already in flight
        rig.scheduler.enqueue("1000000005", 1).await.unwrap();

        let batch: Vec<String> = [
            "1000000001",
            "1000000002",
            "1000000003",
            "1000000004",
            "1000000005",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let result = rig.orchestrator.submit_batch(&batch).await.unwrap();

        assert_eq!(result.total, 5);
        assert_eq!(result.found_in_store, 2);
        assert_eq!(result.enqueued, 2);
        assert_eq!(result.in_flight, 1);
        assert_eq!(result.errors, 0);

        // Exactly 2 net-new jobs beyond the pre-existing one
        assert_eq!(rig.scheduler.stats().await.unwrap().queued, 3);
    }

    #[tokio::test]
    async fn test_double_submission_is_idempotent() {
        let rig = rig();
        let batch: Vec<String> = ["1000000003", "1000000004"]
            .into_iter()
            .map(String::from)
            .collect();

        let first = rig.orchestrator.submit_batch(&batch).await.unwrap();
        assert_eq!(first.enqueued, 2);

        let second = rig.orchestrator.submit_batch(&batch).await.unwrap();
        assert_eq!(second.enqueued, 0);
        assert_eq!(second.in_flight, 2);
        assert_eq!(second.errors, 0);

        // Zero net-new jobs from the second submission
        assert_eq!(rig.scheduler.stats().await.unwrap().queued, 2);
    }

    #[tokio::test]
    async fn test_duplicate_rows_within_one_batch() {
        let rig = rig();
        let batch: Vec<String> = ["1000000003", "1.000.000.003"]
            .into_iter()
            .map(String::from)
            .collect();

        let result = rig.orchestrator.submit_batch(&batch).await.unwrap();
        assert_eq!(result.enqueued, 1);
        assert_eq!(result.in_flight, 1);
        assert_eq!(rig.scheduler.stats().await.unwrap().queued, 1);
    }

    #[tokio::test]
    async fn test_malformed_rows_reported_with_index() {
        let rig = rig();
        let batch: Vec<String> = ["1000000003", "not-a-document", ""]
            .into_iter()
            .map(String::from)
            .collect();

        let result = rig.orchestrator.submit_batch(&batch).await.unwrap();
        assert_eq!(result.enqueued, 1);
        assert_eq!(result.errors, 2);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].row, 1);
        assert_eq!(result.failures[1].row, 2);
    }

    #[tokio::test]
    async fn test_stale_record_is_refetched() {
        let rig = rig();
        // Fetched long before the freshness window
        rig.record_store.seed(sample_record("1000000001"), 100);

        let batch = vec!["1000000001".to_string()];
        let result = rig.orchestrator.submit_batch(&batch).await.unwrap();
        assert_eq!(result.found_in_store, 0);
        assert_eq!(result.enqueued, 1);
    }

    #[tokio::test]
    async fn test_refresh_all_bypasses_freshness() {
        let rig = rig();
        rig.record_store.seed(sample_record("1000000001"), 999_900);
        rig.record_store.seed(sample_record("1000000002"), 999_900);

        let result = rig.orchestrator.refresh_all().await.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.enqueued, 2);
        assert_eq!(result.found_in_store, 0);
    }

    #[tokio::test]
    async fn test_report_reconciles_latest_job_per_document() {
        let rig = rig();
        let batch: Vec<String> = ["1000000003", "1000000004"]
            .into_iter()
            .map(String::from)
            .collect();
        rig.orchestrator.submit_batch(&batch).await.unwrap();

        // Drive the first job to completion through the scheduler
        let mut job = rig.scheduler.dequeue_next().await.unwrap().unwrap();
        let record = sample_record(&job.document.clone());
        rig.scheduler.mark_completed(&mut job, record).await.unwrap();

        let report = rig
            .orchestrator
            .build_report(&["1000000003".to_string(), "1000000004".to_string(), "1000000099".to_string()])
            .await
            .unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(report[0].state, Some(JobState::Completed));
        assert!(report[0].result.is_some());
        assert_eq!(report[1].state, Some(JobState::Queued));
        // Never-submitted document reports no job at all
        assert!(report[2].state.is_none());
    }
}
