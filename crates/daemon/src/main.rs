//! Padron Query Engine - Main Entry Point
//!
//! Composition root: wires the stores, the circuit breaker, the scheduler,
//! the worker pool (one scraper session per worker) and the RPC surface.

mod telemetry;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use padron_api_rpc::{server::RpcServerConfig, RpcServer};
use padron_core::application::{
    shutdown_channel, BreakerConfig, BulkOrchestrator, CircuitBreaker, HousekeepingScheduler,
    LookupService, OrchestratorConfig, QueueScheduler, RetryPolicy, StartupRecovery, WorkerPool,
};
use padron_core::port::id_provider::UuidProvider;
use padron_core::port::time_provider::SystemTimeProvider;
use padron_core::port::{ElectoralFetcher, HousekeepingConfig};
use padron_infra_fetch::{ScraperCommandFetcher, ScraperConfig};
use padron_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStore, SqliteMaintenance, SqliteRecordStore,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.padron/padron.db";

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn load_config() -> (OrchestratorConfig, BreakerConfig) {
    let defaults = OrchestratorConfig::default();
    let orchestrator = OrchestratorConfig {
        pool_size: env_parse("PADRON_WORKERS", defaults.pool_size).clamp(1, 4),
        max_attempts: env_parse("PADRON_MAX_ATTEMPTS", defaults.max_attempts),
        base_delay_ms: env_parse("PADRON_RETRY_BASE_DELAY_MS", defaults.base_delay_ms),
        max_delay_ms: env_parse("PADRON_RETRY_MAX_DELAY_MS", defaults.max_delay_ms),
        fetch_timeout: Duration::from_secs(env_parse("PADRON_FETCH_TIMEOUT_SECS", 90)),
        record_freshness_ms: env_parse("PADRON_FRESHNESS_DAYS", 30i64) * 24 * 60 * 60 * 1000,
        default_priority: defaults.default_priority,
        bulk_priority: defaults.bulk_priority,
    };

    let breaker_defaults = BreakerConfig::default();
    let breaker = BreakerConfig {
        failure_threshold: env_parse("PADRON_BREAKER_THRESHOLD", breaker_defaults.failure_threshold),
        cooldown_ms: env_parse("PADRON_BREAKER_COOLDOWN_MS", breaker_defaults.cooldown_ms),
    };

    (orchestrator, breaker)
}

/// One scraper session per worker, each with its own browser profile dir so
/// sessions never share state.
fn build_fetchers(config: &OrchestratorConfig) -> Vec<Arc<dyn ElectoralFetcher>> {
    let command = std::env::var("PADRON_SCRAPER_CMD")
        .unwrap_or_else(|_| "padron-scraper".to_string());
    let base_args: Vec<String> = std::env::var("PADRON_SCRAPER_ARGS")
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default();

    (0..config.pool_size)
        .map(|worker_id| {
            let profile_dir =
                shellexpand::tilde(&format!("~/.padron/sessions/{}", worker_id)).into_owned();
            let mut args = base_args.clone();
            args.push("--profile".to_string());
            args.push(profile_dir);

            let mut scraper = ScraperConfig::new(command.clone());
            scraper.base_args = args;
            // Leave headroom below the worker's hard timeout so the exit
            // code, not the kill, classifies the failure
            scraper.timeout = config
                .fetch_timeout
                .saturating_sub(Duration::from_secs(10))
                .max(Duration::from_secs(10));

            Arc::new(ScraperCommandFetcher::new(scraper)) as Arc<dyn ElectoralFetcher>
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("PADRON_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("padron=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Padron Query Engine v{} starting...", VERSION);

    if let Err(e) = telemetry::init_telemetry() {
        tracing::warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    // 2. Load configuration
    let (config, breaker_config) = load_config();
    let db_path = std::env::var("PADRON_DB_PATH")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());
    let rpc_port: u16 = env_parse("PADRON_RPC_PORT", 9343);

    info!(db_path = %db_path, workers = config.pool_size, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&db_path).await?;
    run_migrations(&pool).await?;

    // 4. Setup dependencies (DI wiring)
    let clock = Arc::new(SystemTimeProvider);
    let ids = Arc::new(UuidProvider);
    let job_store = Arc::new(SqliteJobStore::new(pool.clone()));
    let record_store = Arc::new(SqliteRecordStore::new(pool.clone()));

    // The one piece of process-wide mutable state: a single breaker shared
    // by the scheduler and every worker
    let breaker = Arc::new(CircuitBreaker::new(breaker_config, clock.clone()));

    let scheduler = Arc::new(QueueScheduler::new(
        job_store.clone(),
        breaker.clone(),
        ids,
        clock.clone(),
        config.max_attempts,
    ));

    // 5. Crash recovery: requeue jobs orphaned mid-fetch by a previous run
    info!("Running crash recovery...");
    let recovery = StartupRecovery::new(job_store.clone(), clock.clone());
    match recovery.recover_orphaned_jobs().await {
        Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
        Err(e) => tracing::error!(error = ?e, "Crash recovery failed"),
    }

    // 6. Application services
    let lookup = Arc::new(LookupService::new(
        scheduler.clone(),
        record_store.clone(),
        job_store.clone(),
        clock.clone(),
        config.record_freshness_ms,
        config.default_priority,
    ));
    let bulk = Arc::new(BulkOrchestrator::new(
        scheduler.clone(),
        record_store.clone(),
        job_store.clone(),
        clock.clone(),
        config.record_freshness_ms,
        config.bulk_priority,
    ));
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), clock.clone()));

    // 7. Worker pool, one fetcher session per worker
    let retry_policy = Arc::new(RetryPolicy::new(config.base_delay_ms, config.max_delay_ms));
    let worker_pool = WorkerPool::new(
        scheduler.clone(),
        record_store.clone(),
        build_fetchers(&config),
        retry_policy,
        breaker.clone(),
        clock.clone(),
        config.fetch_timeout,
    );
    let pool_controller = worker_pool.controller();

    // 8. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        lookup,
        bulk,
        scheduler.clone(),
        pool_controller,
        breaker.clone(),
        maintenance.clone(),
    );
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 9. Start workers
    info!(workers = worker_pool.size(), "Starting worker pool...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker_handles = worker_pool.spawn(shutdown_rx);

    // 10. Start housekeeping
    info!("Starting housekeeping scheduler...");
    let housekeeping_config = HousekeepingConfig {
        terminal_job_retention_days: env_parse("PADRON_JOB_RETENTION_DAYS", 7),
        ..HousekeepingConfig::default()
    };
    let housekeeping = HousekeepingScheduler::new(maintenance, housekeeping_config, 24);
    tokio::spawn(async move {
        housekeeping.run().await;
    });

    info!("System ready. Waiting for lookups...");
    info!("Press Ctrl+C to shutdown");

    // 11. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 12. Graceful shutdown: stop dispatch, let in-flight fetches finish
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    for handle in worker_handles {
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }

    info!("Shutdown complete.");

    Ok(())
}
