// Padron Infrastructure - SQLite Adapter
// Implements: JobStore, RecordStore, Maintenance

mod connection;
mod job_store;
mod maintenance_impl;
mod migration;
mod record_store;

pub use connection::create_pool;
pub use job_store::SqliteJobStore;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use record_store::SqliteRecordStore;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
