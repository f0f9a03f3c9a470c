// Application Layer - Orchestration services

pub mod breaker;
pub mod bulk;
pub mod config;
pub mod housekeeping;
pub mod lookup;
pub mod recovery;
pub mod retry;
pub mod scheduler;
pub mod worker;

// Re-exports
pub use breaker::{BreakerState, BreakerStats, CircuitBreaker};
pub use bulk::{BulkOrchestrator, BulkResult, RowFailure, RowOutcome};
pub use config::{BreakerConfig, OrchestratorConfig};
pub use housekeeping::HousekeepingScheduler;
pub use lookup::{JobStatus, LookupOutcome, LookupService};
pub use recovery::StartupRecovery;
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{QueueScheduler, QueueStats};
pub use worker::{
    shutdown_channel, PoolController, ShutdownSender, ShutdownToken, Worker, WorkerPool,
    WorkerStats,
};
