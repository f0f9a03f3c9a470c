//! JSON-RPC Server
//!
//! Binds the method table onto a localhost TCP listener. Security: only
//! binds 127.0.0.1 (no external access); auth lives in front of this.

use crate::handler::RpcHandler;
use crate::types::{
    ControlRequest, DeleteJobRequest, JobStatusRequest, PurgeRequest, RefreshAllRequest,
    ReportRequest, RetryJobRequest, StatsRequest, SubmitBatchRequest, SubmitLookupRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use padron_core::application::{
    BulkOrchestrator, CircuitBreaker, LookupService, PoolController, QueueScheduler,
};
use padron_core::port::Maintenance;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9343;

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        lookup: Arc<LookupService>,
        bulk: Arc<BulkOrchestrator>,
        scheduler: Arc<QueueScheduler>,
        pool: Arc<PoolController>,
        breaker: Arc<CircuitBreaker>,
        maintenance: Arc<dyn Maintenance>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(
                lookup,
                bulk,
                scheduler,
                pool,
                breaker,
                maintenance,
            )),
        }
    }

    /// Start the JSON-RPC server
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server on TCP (localhost only)"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("lookup.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SubmitLookupRequest = params.parse()?;
                    handler.submit_lookup(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("lookup.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobStatusRequest = params.parse()?;
                    handler.job_status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("bulk.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SubmitBatchRequest = params.parse()?;
                    handler.submit_batch(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("bulk.refresh.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let _req: RefreshAllRequest = params.parse()?;
                    handler.refresh_all().await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("bulk.report.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ReportRequest = params.parse()?;
                    handler.report(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let _req: StatsRequest = params.parse()?;
                    handler.queue_stats().await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_method("workers.stats.v1", move |params, _, _| {
                let _req: StatsRequest = params.parse()?;
                Ok::<_, jsonrpsee::types::ErrorObjectOwned>(handler.worker_stats())
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_method("breaker.stats.v1", move |params, _, _| {
                let _req: StatsRequest = params.parse()?;
                Ok::<_, jsonrpsee::types::ErrorObjectOwned>(handler.breaker_stats())
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_method("workers.pause.v1", move |params, _, _| {
                let _req: ControlRequest = params.parse()?;
                handler.pause_workers()
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_method("workers.resume.v1", move |params, _, _| {
                let _req: ControlRequest = params.parse()?;
                handler.resume_workers()
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.retry.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RetryJobRequest = params.parse()?;
                    handler.retry_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("job.delete.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DeleteJobRequest = params.parse()?;
                    handler.delete_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.retryFailed.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let _req: ControlRequest = params.parse()?;
                    handler.retry_all_failed().await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("jobs.deleteFailed.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let _req: ControlRequest = params.parse()?;
                    handler.delete_all_failed().await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.purge.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PurgeRequest = params.parse()?;
                    handler.purge(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let _req: StatsRequest = params.parse()?;
                    handler.admin_stats().await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}
