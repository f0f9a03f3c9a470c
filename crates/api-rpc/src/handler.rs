//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method. Mutating
//! endpoints go through the token-bucket rate limiter; reads are free.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    AdminStatsResponse, ControlResponse, CountResponse, DeleteJobRequest, DeleteJobResponse,
    JobStatusRequest, PurgeRequest, ReportRequest, RetryJobRequest, RetryJobResponse,
    SubmitBatchRequest, SubmitLookupRequest, SubmitLookupResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use padron_core::application::{
    BreakerStats, BulkOrchestrator, BulkResult, CircuitBreaker, JobStatus, LookupOutcome,
    LookupService, PoolController, QueueScheduler, QueueStats, RowOutcome, WorkerStats,
};
use padron_core::port::Maintenance;
use std::sync::Arc;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    lookup: Arc<LookupService>,
    bulk: Arc<BulkOrchestrator>,
    scheduler: Arc<QueueScheduler>,
    pool: Arc<PoolController>,
    breaker: Arc<CircuitBreaker>,
    maintenance: Arc<dyn Maintenance>,
    rate_limiter: Arc<RateLimiter>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(
        lookup: Arc<LookupService>,
        bulk: Arc<BulkOrchestrator>,
        scheduler: Arc<QueueScheduler>,
        pool: Arc<PoolController>,
        breaker: Arc<CircuitBreaker>,
        maintenance: Arc<dyn Maintenance>,
    ) -> Self {
        // Default: 200 burst, 100 req/sec (configurable via env)
        let max_burst: u32 = std::env::var("PADRON_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("PADRON_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            lookup,
            bulk,
            scheduler,
            pool,
            breaker,
            maintenance,
            rate_limiter: Arc::new(RateLimiter::new(max_burst, rate_per_sec)),
            start_time: std::time::Instant::now(),
        }
    }

    fn check_rate_limit(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.check() {
            Ok(())
        } else {
            Err(throttled())
        }
    }

    /// lookup.submit.v1
    pub async fn submit_lookup(
        &self,
        params: SubmitLookupRequest,
    ) -> Result<SubmitLookupResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;

        let outcome = self
            .lookup
            .submit_lookup(&params.document)
            .await
            .map_err(to_rpc_error)?;

        Ok(match outcome {
            LookupOutcome::Fresh(record) => SubmitLookupResponse {
                document: params.document,
                record: Some(record),
                job_id: None,
                already_in_flight: false,
            },
            LookupOutcome::Scheduled { job_id } => SubmitLookupResponse {
                document: params.document,
                record: None,
                job_id: Some(job_id),
                already_in_flight: false,
            },
            LookupOutcome::AlreadyInFlight { job_id } => SubmitLookupResponse {
                document: params.document,
                record: None,
                job_id: Some(job_id),
                already_in_flight: true,
            },
        })
    }

    /// lookup.status.v1
    pub async fn job_status(
        &self,
        params: JobStatusRequest,
    ) -> Result<JobStatus, ErrorObjectOwned> {
        self.lookup
            .job_status(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// bulk.submit.v1
    pub async fn submit_batch(
        &self,
        params: SubmitBatchRequest,
    ) -> Result<BulkResult, ErrorObjectOwned> {
        self.check_rate_limit()?;
        self.bulk
            .submit_batch(&params.documents)
            .await
            .map_err(to_rpc_error)
    }

    /// bulk.refresh.v1
    pub async fn refresh_all(&self) -> Result<BulkResult, ErrorObjectOwned> {
        self.check_rate_limit()?;
        self.bulk.refresh_all().await.map_err(to_rpc_error)
    }

    /// bulk.report.v1
    pub async fn report(
        &self,
        params: ReportRequest,
    ) -> Result<Vec<RowOutcome>, ErrorObjectOwned> {
        self.bulk
            .build_report(&params.documents)
            .await
            .map_err(to_rpc_error)
    }

    /// queue.stats.v1
    pub async fn queue_stats(&self) -> Result<QueueStats, ErrorObjectOwned> {
        self.scheduler.stats().await.map_err(to_rpc_error)
    }

    /// workers.stats.v1
    pub fn worker_stats(&self) -> WorkerStats {
        self.pool.stats()
    }

    /// breaker.stats.v1
    pub fn breaker_stats(&self) -> BreakerStats {
        self.breaker.stats()
    }

    /// workers.pause.v1
    pub fn pause_workers(&self) -> Result<ControlResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;
        self.pool.pause();
        Ok(ControlResponse { paused: true })
    }

    /// workers.resume.v1
    pub fn resume_workers(&self) -> Result<ControlResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;
        self.pool.resume();
        Ok(ControlResponse { paused: false })
    }

    /// job.retry.v1
    pub async fn retry_job(
        &self,
        params: RetryJobRequest,
    ) -> Result<RetryJobResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;
        let job = self
            .scheduler
            .retry_job(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(RetryJobResponse {
            job_id: job.id,
            state: job.state.to_string(),
        })
    }

    /// job.delete.v1
    pub async fn delete_job(
        &self,
        params: DeleteJobRequest,
    ) -> Result<DeleteJobResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;
        self.scheduler
            .delete_job(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeleteJobResponse {
            job_id: params.job_id,
            deleted: true,
        })
    }

    /// jobs.retryFailed.v1
    pub async fn retry_all_failed(&self) -> Result<CountResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;
        let count = self
            .scheduler
            .retry_all_failed()
            .await
            .map_err(to_rpc_error)?;
        Ok(CountResponse { count })
    }

    /// jobs.deleteFailed.v1
    pub async fn delete_all_failed(&self) -> Result<CountResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;
        let count = self
            .scheduler
            .delete_all_failed()
            .await
            .map_err(to_rpc_error)?;
        Ok(CountResponse { count })
    }

    /// admin.purge.v1
    pub async fn purge(&self, params: PurgeRequest) -> Result<CountResponse, ErrorObjectOwned> {
        self.check_rate_limit()?;
        let retention_ms = params.days * 24 * 60 * 60 * 1000;
        let count = self
            .scheduler
            .purge_older_than(retention_ms)
            .await
            .map_err(to_rpc_error)?;
        Ok(CountResponse { count })
    }

    /// admin.stats.v1
    pub async fn admin_stats(&self) -> Result<AdminStatsResponse, ErrorObjectOwned> {
        let queue = self.scheduler.stats().await.map_err(to_rpc_error)?;
        let store = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(AdminStatsResponse {
            total_jobs: queue.total,
            queued_jobs: queue.queued,
            running_jobs: queue.running,
            completed_jobs: queue.completed,
            failed_jobs: queue.failed,
            citizen_count: store.citizen_count,
            db_size_bytes: store.db_size_bytes,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}
