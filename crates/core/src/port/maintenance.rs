// Store Maintenance port
use crate::error::Result;
use async_trait::async_trait;

/// Store maintenance statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub job_count: i64,
    pub terminal_job_count: i64,
    pub citizen_count: i64,
    pub fragmentation_percent: f64,
}

/// Housekeeping configuration
#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    /// Retention period for terminal (COMPLETED/FAILED) jobs, in days
    pub terminal_job_retention_days: i64,

    /// Maximum DB size before forcing VACUUM (MB)
    pub max_db_size_mb: f64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            terminal_job_retention_days: 7,
            max_db_size_mb: 1000.0,
        }
    }
}

/// Store maintenance operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Run VACUUM to reclaim space and optimize the store
    ///
    /// # Returns
    /// Space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    /// Delete terminal jobs older than the retention period
    ///
    /// # Returns
    /// Number of jobs deleted
    async fn purge_terminal_jobs(&self, retention_days: i64) -> Result<i64>;

    /// Get maintenance statistics
    async fn get_stats(&self) -> Result<StoreStats>;

    /// Run full maintenance (purge + VACUUM when the store has grown)
    async fn run_full(&self, config: &HousekeepingConfig) -> Result<StoreStats> {
        let stats_before = self.get_stats().await?;

        let deleted_jobs = self
            .purge_terminal_jobs(config.terminal_job_retention_days)
            .await?;

        let reclaimed_mb = if stats_before.db_size_mb > config.max_db_size_mb {
            self.vacuum().await?
        } else {
            0.0
        };

        let stats_after = self.get_stats().await?;

        tracing::info!(
            deleted_jobs = deleted_jobs,
            reclaimed_mb = reclaimed_mb,
            db_size_mb = stats_after.db_size_mb,
            "Housekeeping completed"
        );

        Ok(stats_after)
    }
}
