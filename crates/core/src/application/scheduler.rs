// Queue Scheduler - owns the job queue and every state transition
//
// All mutations of the job store flow through this type. One async mutex
// serializes enqueue/dequeue/requeue/operator transitions against the
// per-document de-duplication check; the fetch itself happens outside any
// lock. Stats are snapshot reads that never take the dispatch lock.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::breaker::CircuitBreaker;
use crate::domain::{
    normalize_document, validate_document, DomainError, ElectoralRecord, JobError, JobId,
    JobState, LookupJob,
};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};

/// Counts by state for the status surface.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

pub struct QueueScheduler {
    store: Arc<dyn JobStore>,
    breaker: Arc<CircuitBreaker>,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn TimeProvider>,
    max_attempts: i32,
    /// Serializes dispatch and de-dup sensitive transitions.
    dispatch_lock: Mutex<()>,
}

impl QueueScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        breaker: Arc<CircuitBreaker>,
        ids: Arc<dyn IdProvider>,
        clock: Arc<dyn TimeProvider>,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            breaker,
            ids,
            clock,
            max_attempts,
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Create a QUEUED job for a document.
    ///
    /// Fails with `DomainError::DuplicateInFlight` when a non-terminal job
    /// already exists for the same document; callers should observe the
    /// existing job instead.
    pub async fn enqueue(&self, document: &str, priority: i32) -> Result<JobId> {
        let document = normalize_document(document);
        validate_document(&document).map_err(AppError::Domain)?;

        let _guard = self.dispatch_lock.lock().await;

        if let Some(existing) = self.store.find_active_by_document(&document).await? {
            debug!(
                document = %document,
                existing_job = %existing.id,
                "Enqueue rejected, lookup already in flight"
            );
            return Err(AppError::Domain(DomainError::DuplicateInFlight(document)));
        }

        let id = self.ids.generate_id();
        let now = self.clock.now_millis();
        let job = LookupJob::new(id.clone(), &document, now, priority, self.max_attempts);
        self.store.insert(&job).await?;

        info!(job_id = %id, document = %document, priority = priority, "Job enqueued");
        Ok(id)
    }

    /// Hand the next eligible job to an idle worker.
    ///
    /// Selection: lowest priority value first, FIFO by creation within a
    /// band, `eligible_at` in the past. Returns None when the queue is
    /// empty or the breaker refuses dispatch - a breaker permit is only
    /// consumed once an eligible job actually exists, so an empty queue can
    /// never eat the single half-open probe.
    pub async fn dequeue_next(&self) -> Result<Option<LookupJob>> {
        let _guard = self.dispatch_lock.lock().await;
        let now = self.clock.now_millis();

        if self.store.peek_next(now).await?.is_none() {
            return Ok(None);
        }
        if !self.breaker.allow_request() {
            debug!("Dispatch held back by circuit breaker");
            return Ok(None);
        }

        let job = self.store.claim_next(now).await?;
        if let Some(job) = &job {
            debug!(job_id = %job.id, document = %job.document, attempt = job.attempts, "Job dispatched");
        }
        Ok(job)
    }

    /// Move a RUNNING job back to QUEUED, not dispatchable before
    /// `now + delay_ms`. The attempt stays consumed.
    pub async fn requeue_with_delay(
        &self,
        job: &mut LookupJob,
        delay_ms: i64,
        error: Option<JobError>,
    ) -> Result<()> {
        let _guard = self.dispatch_lock.lock().await;
        let now = self.clock.now_millis();
        job.requeue(now, now + delay_ms, error)
            .map_err(AppError::Domain)?;
        self.store.update(job).await
    }

    /// Requeue after an infrastructure fault: the attempt is refunded and
    /// the job becomes eligible again after a short grace delay.
    pub async fn requeue_infrastructure(
        &self,
        job: &mut LookupJob,
        delay_ms: i64,
        error: Option<JobError>,
    ) -> Result<()> {
        let _guard = self.dispatch_lock.lock().await;
        let now = self.clock.now_millis();
        job.requeue(now, now + delay_ms, error)
            .map_err(AppError::Domain)?;
        job.refund_attempt();
        self.store.update(job).await
    }

    /// RUNNING -> COMPLETED with the fetched record.
    pub async fn mark_completed(
        &self,
        job: &mut LookupJob,
        record: ElectoralRecord,
    ) -> Result<()> {
        let now = self.clock.now_millis();
        job.complete(now, record).map_err(AppError::Domain)?;
        self.store.update(job).await
    }

    /// RUNNING -> FAILED (terminal).
    pub async fn mark_failed(&self, job: &mut LookupJob, error: JobError) -> Result<()> {
        let now = self.clock.now_millis();
        job.fail(now, error).map_err(AppError::Domain)?;
        self.store.update(job).await
    }

    /// Snapshot of counts by state. Deliberately lock-free with respect to
    /// dispatch so dashboards never stall a worker.
    pub async fn stats(&self) -> Result<QueueStats> {
        let counts = self.store.counts().await?;
        Ok(QueueStats {
            queued: counts.queued,
            running: counts.running,
            completed: counts.completed,
            failed: counts.failed,
            total: counts.total(),
        })
    }

    pub async fn job_by_id(&self, id: &JobId) -> Result<Option<LookupJob>> {
        self.store.find_by_id(id).await
    }

    // ------------------------------------------------------------------
    // Operator controls
    // ------------------------------------------------------------------

    /// Reset a FAILED job to QUEUED with a fresh attempt budget.
    ///
    /// Rejected for non-terminal or COMPLETED jobs, and when another lookup
    /// for the same document is meanwhile in flight.
    pub async fn retry_job(&self, id: &JobId) -> Result<LookupJob> {
        let _guard = self.dispatch_lock.lock().await;

        let mut job = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

        if let Some(active) = self.store.find_active_by_document(&job.document).await? {
            if active.id != job.id {
                return Err(AppError::Conflict(format!(
                    "Document {} already has an active lookup ({})",
                    job.document, active.id
                )));
            }
        }

        let now = self.clock.now_millis();
        job.reset_for_retry(now).map_err(AppError::Domain)?;
        self.store.update(&job).await?;

        info!(job_id = %id, document = %job.document, "Job reset for retry");
        Ok(job)
    }

    /// Delete a QUEUED or FAILED job. RUNNING jobs belong to their worker
    /// and COMPLETED jobs are only removed by housekeeping.
    pub async fn delete_job(&self, id: &JobId) -> Result<()> {
        let _guard = self.dispatch_lock.lock().await;

        let job = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

        match job.state {
            JobState::Queued | JobState::Failed => {
                self.store.delete(id).await?;
                info!(job_id = %id, state = %job.state, "Job deleted");
                Ok(())
            }
            JobState::Running | JobState::Completed => Err(AppError::InvalidState(format!(
                "Cannot delete job {} in state {}",
                id, job.state
            ))),
        }
    }

    /// Reset every FAILED job whose document has no other active lookup.
    /// Returns the number actually reset.
    pub async fn retry_all_failed(&self) -> Result<u64> {
        let _guard = self.dispatch_lock.lock().await;
        let failed = self.store.find_by_state(JobState::Failed).await?;
        let now = self.clock.now_millis();

        let mut reset = 0u64;
        for mut job in failed {
            if let Some(active) = self.store.find_active_by_document(&job.document).await? {
                if active.id != job.id {
                    continue;
                }
            }
            if job.reset_for_retry(now).is_ok() {
                self.store.update(&job).await?;
                reset += 1;
            }
        }

        info!(count = reset, "Failed jobs reset for retry");
        Ok(reset)
    }

    /// Delete every FAILED job. Returns the number removed.
    pub async fn delete_all_failed(&self) -> Result<u64> {
        let _guard = self.dispatch_lock.lock().await;
        let deleted = self.store.delete_by_state(JobState::Failed).await?;
        info!(count = deleted, "Failed jobs deleted");
        Ok(deleted)
    }

    /// Remove terminal jobs older than `retention_ms`. Housekeeping entry
    /// point; also exposed to operators.
    pub async fn purge_older_than(&self, retention_ms: i64) -> Result<u64> {
        let cutoff = self.clock.now_millis() - retention_ms;
        let purged = self.store.purge_terminal_older_than(cutoff).await?;
        info!(count = purged, cutoff = cutoff, "Terminal jobs purged");
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::BreakerConfig;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::mocks::MockClock;
    use tokio::task::JoinSet;

    fn scheduler_with_clock(clock: Arc<MockClock>) -> (QueueScheduler, Arc<CircuitBreaker>) {
        let breaker = Arc::new(CircuitBreaker::new(
            BreakerConfig {
                failure_threshold: 3,
                cooldown_ms: 60_000,
            },
            clock.clone(),
        ));
        let scheduler = QueueScheduler::new(
            Arc::new(InMemoryJobStore::new()),
            breaker.clone(),
            Arc::new(SequentialIdProvider::new()),
            clock,
            3,
        );
        (scheduler, breaker)
    }

    #[tokio::test]
    async fn test_priority_then_fifo_ordering() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock.clone());

        // Enqueued in order with priorities [3, 1, 2, 1]
        let mut ids = vec![];
        for (document, priority) in [
            ("1000000001", 3),
            ("1000000002", 1),
            ("1000000003", 2),
            ("1000000004", 1),
        ] {
            clock.advance(10);
            ids.push(scheduler.enqueue(document, priority).await.unwrap());
        }

        let order: Vec<String> = {
            let mut order = vec![];
            while let Some(job) = scheduler.dequeue_next().await.unwrap() {
                order.push(job.id);
            }
            order
        };

        // priority 1 (older first), then 2, then 3
        assert_eq!(
            order,
            vec![
                ids[1].clone(),
                ids[3].clone(),
                ids[2].clone(),
                ids[0].clone()
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_rejected() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock);

        scheduler.enqueue("1083432108", 1).await.unwrap();
        let err = scheduler.enqueue("1083432108", 1).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::DuplicateInFlight(_))
        ));

        // Normalization folds formatted variants onto the same document
        let err = scheduler.enqueue("1.083.432.108", 1).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::DuplicateInFlight(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_single_winner() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock);
        let scheduler = Arc::new(scheduler);

        let mut tasks = JoinSet::new();
        for _ in 0..10 {
            let scheduler = scheduler.clone();
            tasks.spawn(async move { scheduler.enqueue("1083432108", 1).await });
        }

        let mut successes = 0;
        let mut duplicates = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::Domain(DomainError::DuplicateInFlight(_))) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(duplicates, 9);
        assert_eq!(scheduler.stats().await.unwrap().queued, 1);
    }

    #[tokio::test]
    async fn test_document_requeryable_after_terminal() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock);

        scheduler.enqueue("1083432108", 1).await.unwrap();
        let mut job = scheduler.dequeue_next().await.unwrap().unwrap();
        scheduler
            .mark_completed(
                &mut job,
                crate::port::fetcher::mocks::sample_record("1083432108"),
            )
            .await
            .unwrap();

        // Terminal job releases the document
        scheduler.enqueue("1083432108", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_dequeue_blocked_while_breaker_open() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, breaker) = scheduler_with_clock(clock.clone());

        scheduler.enqueue("1083432108", 1).await.unwrap();
        for _ in 0..3 {
            breaker.record_result(false);
        }
        assert_eq!(breaker.state(), crate::application::breaker::BreakerState::Open);

        assert!(scheduler.dequeue_next().await.unwrap().is_none());

        // After cooldown the single probe goes through
        clock.advance(60_000);
        assert!(scheduler.dequeue_next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_backoff_gates_eligibility() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock.clone());

        scheduler.enqueue("1083432108", 1).await.unwrap();
        let mut job = scheduler.dequeue_next().await.unwrap().unwrap();
        scheduler
            .requeue_with_delay(
                &mut job,
                5_000,
                Some(JobError::new(
                    crate::domain::FailureKind::Timeout,
                    "timed out",
                )),
            )
            .await
            .unwrap();

        // Still QUEUED externally, but not eligible yet
        assert_eq!(scheduler.stats().await.unwrap().queued, 1);
        assert!(scheduler.dequeue_next().await.unwrap().is_none());

        clock.advance(5_000);
        let job = scheduler.dequeue_next().await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_job_rules() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock);

        let id = scheduler.enqueue("1083432108", 1).await.unwrap();

        // Queued job is not retryable
        assert!(matches!(
            scheduler.retry_job(&id).await.unwrap_err(),
            AppError::Domain(DomainError::InvalidStateTransition { .. })
        ));

        let mut job = scheduler.dequeue_next().await.unwrap().unwrap();
        scheduler
            .mark_failed(
                &mut job,
                JobError::new(crate::domain::FailureKind::NotFound, "no row"),
            )
            .await
            .unwrap();

        let retried = scheduler.retry_job(&id).await.unwrap();
        assert_eq!(retried.state, JobState::Queued);
        assert_eq!(retried.attempts, 0);
        assert!(retried.last_error.is_none());
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock);

        let id = scheduler.enqueue("1083432108", 1).await.unwrap();
        let _running = scheduler.dequeue_next().await.unwrap().unwrap();

        // Running jobs belong to their worker
        assert!(matches!(
            scheduler.delete_job(&id).await.unwrap_err(),
            AppError::InvalidState(_)
        ));

        let id2 = scheduler.enqueue("1000000099", 1).await.unwrap();
        scheduler.delete_job(&id2).await.unwrap();
        assert!(matches!(
            scheduler.delete_job(&id2).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_retry_and_delete_all_failed() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock);

        for document in ["1000000001", "1000000002", "1000000003"] {
            scheduler.enqueue(document, 1).await.unwrap();
            let mut job = scheduler.dequeue_next().await.unwrap().unwrap();
            scheduler
                .mark_failed(
                    &mut job,
                    JobError::new(crate::domain::FailureKind::CaptchaFailed, "captcha"),
                )
                .await
                .unwrap();
        }

        assert_eq!(scheduler.retry_all_failed().await.unwrap(), 3);
        assert_eq!(scheduler.stats().await.unwrap().queued, 3);
        assert_eq!(scheduler.retry_all_failed().await.unwrap(), 0);

        // Fail them again and bulk-delete
        for _ in 0..3 {
            let mut job = scheduler.dequeue_next().await.unwrap().unwrap();
            scheduler
                .mark_failed(
                    &mut job,
                    JobError::new(crate::domain::FailureKind::CaptchaFailed, "captcha"),
                )
                .await
                .unwrap();
        }
        assert_eq!(scheduler.delete_all_failed().await.unwrap(), 3);
        assert_eq!(scheduler.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let clock = Arc::new(MockClock::new(1_000));
        let (scheduler, _) = scheduler_with_clock(clock.clone());

        scheduler.enqueue("1083432108", 1).await.unwrap();
        let mut job = scheduler.dequeue_next().await.unwrap().unwrap();
        scheduler
            .mark_completed(
                &mut job,
                crate::port::fetcher::mocks::sample_record("1083432108"),
            )
            .await
            .unwrap();

        // Not old enough yet
        clock.advance(1_000);
        assert_eq!(scheduler.purge_older_than(10_000).await.unwrap(), 0);

        clock.advance(10_000);
        assert_eq!(scheduler.purge_older_than(10_000).await.unwrap(), 1);
        assert_eq!(scheduler.stats().await.unwrap().total, 0);
    }
}
