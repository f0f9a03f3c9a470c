// Port Layer - Interfaces for external dependencies

pub mod fetcher;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod maintenance;
pub mod record_store;
pub mod time_provider;

// Re-exports
pub use fetcher::{ElectoralFetcher, FetchError};
pub use id_provider::IdProvider;
pub use job_store::{JobCounts, JobStore};
pub use maintenance::{HousekeepingConfig, Maintenance, StoreStats};
pub use record_store::RecordStore;
pub use time_provider::TimeProvider;
