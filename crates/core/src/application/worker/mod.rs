// Worker Pool - bounded executors draining the queue
//
// Each worker exclusively owns one fetcher session for the duration of a
// job; sessions are never shared across workers. A worker suspends while
// awaiting the fetch (bounded by the hard timeout) and while idling on an
// empty queue, a paused pool or an open breaker.

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::breaker::CircuitBreaker;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::scheduler::QueueScheduler;
use crate::domain::{FailureKind, JobError, LookupJob};
use crate::error::Result;
use crate::port::{ElectoralFetcher, FetchError, RecordStore, TimeProvider};

/// Aggregated pool statistics for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub total_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub active_workers: usize,
    pub average_execution_time_ms: f64,
    pub paused: bool,
}

/// Shared pause flag + metrics. Cheap to clone via Arc; the RPC layer holds
/// one for pause/resume/stats without touching the workers themselves.
pub struct PoolController {
    paused: AtomicBool,
    total_processed: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    active_workers: AtomicUsize,
    total_execution_ms: AtomicI64,
}

impl PoolController {
    /// Normally built by `WorkerPool::new`; public for wiring single
    /// workers in tests.
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            total_processed: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            total_execution_ms: AtomicI64::new(0),
        }
    }

    /// Stop workers from dequeuing. In-flight fetches keep running.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("Worker pool paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("Worker pool resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> WorkerStats {
        let processed = self.total_processed.load(Ordering::Relaxed);
        let success = self.success_count.load(Ordering::Relaxed);
        let total_ms = self.total_execution_ms.load(Ordering::Relaxed);
        WorkerStats {
            total_processed: processed,
            success_count: success,
            failure_count: self.failure_count.load(Ordering::Relaxed),
            success_rate: if processed == 0 {
                0.0
            } else {
                success as f64 / processed as f64
            },
            active_workers: self.active_workers.load(Ordering::Relaxed),
            average_execution_time_ms: if processed == 0 {
                0.0
            } else {
                total_ms as f64 / processed as f64
            },
            paused: self.is_paused(),
        }
    }

    fn record_attempt(&self, success: bool, execution_ms: i64) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_execution_ms
            .fetch_add(execution_ms.max(0), Ordering::Relaxed);
    }
}

impl Default for PoolController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the live-worker gauge on every exit path.
struct ActiveGuard<'a>(&'a PoolController);

impl<'a> ActiveGuard<'a> {
    fn enter(controller: &'a PoolController) -> Self {
        controller.active_workers.fetch_add(1, Ordering::SeqCst);
        Self(controller)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A single executor. Owns its fetcher session exclusively.
pub struct Worker {
    worker_id: usize,
    scheduler: Arc<QueueScheduler>,
    record_store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn ElectoralFetcher>,
    retry_policy: Arc<RetryPolicy>,
    breaker: Arc<CircuitBreaker>,
    clock: Arc<dyn TimeProvider>,
    controller: Arc<PoolController>,
    fetch_timeout: Duration,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: usize,
        scheduler: Arc<QueueScheduler>,
        record_store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn ElectoralFetcher>,
        retry_policy: Arc<RetryPolicy>,
        breaker: Arc<CircuitBreaker>,
        clock: Arc<dyn TimeProvider>,
        controller: Arc<PoolController>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            worker_id,
            scheduler,
            record_store,
            fetcher,
            retry_policy,
            breaker,
            clock,
            controller,
            fetch_timeout,
        }
    }

    /// Run the worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker_id = self.worker_id, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                info!(worker_id = self.worker_id, "Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!(worker_id = self.worker_id, "Worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(worker_id = self.worker_id, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(worker_id = self.worker_id, "Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(worker_id = self.worker_id, "Worker stopped");
        Ok(())
    }

    /// Process the next job from the queue (returns true if one was taken).
    pub async fn process_next_job(&self) -> Result<bool> {
        if self.controller.is_paused() {
            return Ok(false);
        }

        let mut job = match self.scheduler.dequeue_next().await? {
            Some(job) => job,
            None => return Ok(false),
        };

        let _active = ActiveGuard::enter(&self.controller);

        info!(
            worker_id = self.worker_id,
            job_id = %job.id,
            document = %job.document,
            attempt = job.attempts,
            "Processing lookup"
        );

        // The fetch runs in its own task so a panicking scraper adapter
        // cannot take the worker loop down with it. The hard timeout is the
        // only cancellation mechanism for a running fetch.
        let fetcher = Arc::clone(&self.fetcher);
        let document = job.document.clone();
        let timeout = self.fetch_timeout;
        let handle = tokio::task::spawn(async move {
            match tokio::time::timeout(timeout, fetcher.fetch(&document)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout.as_millis() as i64)),
            }
        });

        match handle.await {
            Ok(Ok(record)) => self.finish_success(&mut job, record).await?,
            Ok(Err(fetch_error)) => self.finish_failure(&mut job, fetch_error).await?,
            Err(join_error) => {
                // A panic inside the fetch task counts as a crashed session
                let message = if join_error.is_panic() {
                    format!("fetch task panicked: {}", join_error)
                } else {
                    format!("fetch task cancelled: {}", join_error)
                };
                self.finish_failure(&mut job, FetchError::BrowserCrashed(message))
                    .await?;
            }
        }

        Ok(true)
    }

    async fn finish_success(
        &self,
        job: &mut LookupJob,
        record: crate::domain::ElectoralRecord,
    ) -> Result<()> {
        let now = self.clock.now_millis();
        if let Err(e) = self.record_store.upsert(&job.document, &record, now).await {
            // The fetch itself worked; failing to persist is our fault, not
            // the document's and not the external source's.
            warn!(
                worker_id = self.worker_id,
                job_id = %job.id,
                error = %e,
                "Record store write failed, requeueing without attempt penalty"
            );
            self.breaker.record_result(true);
            let error = JobError::new(
                FailureKind::Environment,
                format!("record store write failed: {}", e),
            );
            return self
                .scheduler
                .requeue_infrastructure(job, INFRA_REQUEUE_DELAY_MS, Some(error))
                .await;
        }

        self.breaker.record_result(true);
        self.scheduler.mark_completed(job, record).await?;
        self.controller
            .record_attempt(true, job.execution_time_ms.unwrap_or(0));

        info!(
            worker_id = self.worker_id,
            job_id = %job.id,
            document = %job.document,
            execution_time_ms = ?job.execution_time_ms,
            "Lookup completed"
        );
        Ok(())
    }

    async fn finish_failure(&self, job: &mut LookupJob, fetch_error: FetchError) -> Result<()> {
        if fetch_error.is_environment() {
            // Infrastructure fault: the document keeps its attempt budget
            // and the breaker learns nothing about the external source.
            warn!(
                worker_id = self.worker_id,
                job_id = %job.id,
                error = %fetch_error,
                "Environment fault, requeueing without attempt penalty"
            );
            let error = JobError::new(fetch_error.kind(), fetch_error.to_string());
            return self
                .scheduler
                .requeue_infrastructure(job, INFRA_REQUEUE_DELAY_MS, Some(error))
                .await;
        }

        self.breaker.record_result(false);
        let error = JobError::new(fetch_error.kind(), fetch_error.to_string());

        match self.retry_policy.should_retry(job) {
            RetryDecision::Retry(delay_ms) => {
                info!(
                    worker_id = self.worker_id,
                    job_id = %job.id,
                    attempt = job.attempts,
                    delay_ms = delay_ms,
                    error = %fetch_error,
                    "Lookup failed, retrying with backoff"
                );
                self.scheduler
                    .requeue_with_delay(job, delay_ms, Some(error))
                    .await?;
            }
            RetryDecision::Exhausted => {
                error!(
                    worker_id = self.worker_id,
                    job_id = %job.id,
                    document = %job.document,
                    attempts = job.attempts,
                    error = %fetch_error,
                    "Lookup failed permanently"
                );
                self.scheduler.mark_failed(job, error).await?;
            }
        }

        self.controller
            .record_attempt(false, job.execution_time_ms.unwrap_or(0));
        Ok(())
    }
}

/// Builds the fixed set of workers and exposes the shared controller.
pub struct WorkerPool {
    workers: Vec<Worker>,
    controller: Arc<PoolController>,
}

impl WorkerPool {
    /// One fetcher session per worker; `fetchers.len()` decides the pool
    /// size. Keep it small (1-4): every concurrent fetch holds a full
    /// scraper session and raises the anti-bot risk.
    pub fn new(
        scheduler: Arc<QueueScheduler>,
        record_store: Arc<dyn RecordStore>,
        fetchers: Vec<Arc<dyn ElectoralFetcher>>,
        retry_policy: Arc<RetryPolicy>,
        breaker: Arc<CircuitBreaker>,
        clock: Arc<dyn TimeProvider>,
        fetch_timeout: Duration,
    ) -> Self {
        let controller = Arc::new(PoolController::new());
        let workers = fetchers
            .into_iter()
            .enumerate()
            .map(|(worker_id, fetcher)| {
                Worker::new(
                    worker_id,
                    Arc::clone(&scheduler),
                    Arc::clone(&record_store),
                    fetcher,
                    Arc::clone(&retry_policy),
                    Arc::clone(&breaker),
                    Arc::clone(&clock),
                    Arc::clone(&controller),
                    fetch_timeout,
                )
            })
            .collect();
        Self {
            workers,
            controller,
        }
    }

    pub fn controller(&self) -> Arc<PoolController> {
        Arc::clone(&self.controller)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Spawn every worker loop onto the runtime.
    pub fn spawn(self, shutdown: ShutdownToken) -> Vec<tokio::task::JoinHandle<()>> {
        self.workers
            .into_iter()
            .map(|worker| {
                let token = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = worker.run(token).await {
                        error!(error = %e, "Worker loop failed");
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::breaker::BreakerState;
    use crate::application::config::BreakerConfig;
    use crate::domain::JobState;
    use crate::port::fetcher::mocks::{
        sample_record, HangingFetcher, PanickingFetcher, ScriptedFetcher,
    };
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::record_store::mocks::InMemoryRecordStore;
    use crate::port::time_provider::mocks::MockClock;

    struct Rig {
        scheduler: Arc<QueueScheduler>,
        record_store: Arc<InMemoryRecordStore>,
        breaker: Arc<CircuitBreaker>,
        clock: Arc<MockClock>,
        controller: Arc<PoolController>,
    }

    fn rig(fetcher: Arc<dyn ElectoralFetcher>, fetch_timeout: Duration) -> (Rig, Worker) {
        let clock = Arc::new(MockClock::new(1_000));
        let breaker = Arc::new(CircuitBreaker::new(
            BreakerConfig {
                failure_threshold: 100,
                cooldown_ms: 60_000,
            },
            clock.clone(),
        ));
        let scheduler = Arc::new(QueueScheduler::new(
            Arc::new(InMemoryJobStore::new()),
            breaker.clone(),
            Arc::new(SequentialIdProvider::new()),
            clock.clone(),
            3,
        ));
        let record_store = Arc::new(InMemoryRecordStore::new());
        let controller = Arc::new(PoolController::new());
        let worker = Worker::new(
            0,
            scheduler.clone(),
            record_store.clone(),
            fetcher,
            Arc::new(RetryPolicy::new(1_000, 60_000)),
            breaker.clone(),
            clock.clone(),
            controller.clone(),
            fetch_timeout,
        );
        (
            Rig {
                scheduler,
                record_store,
                breaker,
                clock,
                controller,
            },
            worker,
        )
    }

    #[tokio::test]
    async fn test_first_try_success_persists_record() {
        let fetcher = Arc::new(ScriptedFetcher::always_success());
        let (rig, worker) = rig(fetcher.clone(), Duration::from_secs(5));

        let id = rig.scheduler.enqueue("1234567890", 1).await.unwrap();
        assert!(worker.process_next_job().await.unwrap());

        let job = rig.scheduler.job_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.result, Some(sample_record("1234567890")));
        assert!(job.last_error.is_none());

        // Record store collaborator written exactly once
        assert_eq!(rig.record_store.upsert_count(), 1);
        assert_eq!(fetcher.call_count(), 1);

        let stats = rig.controller.stats();
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_timeout_three_times_fails_permanently() {
        let fetcher = Arc::new(ScriptedFetcher::always_fail(FetchError::Timeout(90_000)));
        let (rig, worker) = rig(fetcher, Duration::from_secs(5));

        let id = rig.scheduler.enqueue("1083432108", 1).await.unwrap();

        for _ in 0..3 {
            assert!(worker.process_next_job().await.unwrap());
            // Skip past any backoff delay
            rig.clock.advance(10 * 60_000);
        }

        let job = rig.scheduler.job_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.last_error.as_ref().unwrap().kind, FailureKind::Timeout);
        assert_eq!(rig.record_store.upsert_count(), 0);

        // Nothing left to process
        assert!(!worker.process_next_job().await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_then_succeed_within_budget() {
        let fetcher = Arc::new(ScriptedFetcher::fail_then_succeed(
            2,
            FetchError::NetworkError("connection reset".to_string()),
        ));
        let (rig, worker) = rig(fetcher, Duration::from_secs(5));

        let id = rig.scheduler.enqueue("1083432108", 1).await.unwrap();
        for _ in 0..3 {
            assert!(worker.process_next_job().await.unwrap());
            rig.clock.advance(10 * 60_000);
        }

        let job = rig.scheduler.job_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 3);
        assert!(job.last_error.is_none());
    }

    #[tokio::test]
    async fn test_environment_fault_conserves_attempt() {
        let fetcher = Arc::new(ScriptedFetcher::always_fail(FetchError::Environment(
            "scraper binary missing".to_string(),
        )));
        let (rig, worker) = rig(fetcher, Duration::from_secs(5));

        let id = rig.scheduler.enqueue("1083432108", 1).await.unwrap();
        assert!(worker.process_next_job().await.unwrap());

        let job = rig.scheduler.job_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 0);

        // Breaker learned nothing about the external source
        assert_eq!(rig.breaker.state(), BreakerState::Closed);
        assert_eq!(rig.breaker.stats().failure_count, 0);
        // Pool metrics exclude refunded attempts
        assert_eq!(rig.controller.stats().total_processed, 0);
    }

    #[tokio::test]
    async fn test_panic_classified_as_crashed_session() {
        let (rig, worker) = rig(Arc::new(PanickingFetcher), Duration::from_secs(5));

        let id = rig.scheduler.enqueue("1083432108", 1).await.unwrap();
        assert!(worker.process_next_job().await.unwrap());

        let job = rig.scheduler.job_by_id(&id).await.unwrap().unwrap();
        // Never stuck in RUNNING after the fetch resolves
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 1);
        assert_eq!(
            job.last_error.as_ref().unwrap().kind,
            FailureKind::BrowserCrashed
        );
        assert_eq!(rig.breaker.stats().failure_count, 1);
    }

    #[tokio::test]
    async fn test_hard_timeout_cuts_hanging_fetch() {
        let (rig, worker) = rig(Arc::new(HangingFetcher), Duration::from_millis(50));

        let id = rig.scheduler.enqueue("1083432108", 1).await.unwrap();
        assert!(worker.process_next_job().await.unwrap());

        let job = rig.scheduler.job_by_id(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.last_error.as_ref().unwrap().kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_pause_stops_dispatch() {
        let fetcher = Arc::new(ScriptedFetcher::always_success());
        let (rig, worker) = rig(fetcher, Duration::from_secs(5));

        rig.scheduler.enqueue("1083432108", 1).await.unwrap();
        rig.controller.pause();

        assert!(!worker.process_next_job().await.unwrap());
        assert_eq!(rig.scheduler.stats().await.unwrap().queued, 1);

        rig.controller.resume();
        assert!(worker.process_next_job().await.unwrap());
        assert_eq!(rig.scheduler.stats().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn test_pool_builds_one_worker_per_fetcher() {
        let clock = Arc::new(MockClock::new(1_000));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default(), clock.clone()));
        let scheduler = Arc::new(QueueScheduler::new(
            Arc::new(InMemoryJobStore::new()),
            breaker.clone(),
            Arc::new(SequentialIdProvider::new()),
            clock.clone(),
            3,
        ));

        let fetchers: Vec<Arc<dyn ElectoralFetcher>> = vec![
            Arc::new(ScriptedFetcher::always_success()),
            Arc::new(ScriptedFetcher::always_success()),
            Arc::new(ScriptedFetcher::always_success()),
        ];
        let pool = WorkerPool::new(
            scheduler,
            Arc::new(InMemoryRecordStore::new()),
            fetchers,
            Arc::new(RetryPolicy::new(1_000, 60_000)),
            breaker,
            clock,
            Duration::from_secs(5),
        );

        assert_eq!(pool.size(), 3);
        let controller = pool.controller();
        assert!(!controller.is_paused());
    }
}
