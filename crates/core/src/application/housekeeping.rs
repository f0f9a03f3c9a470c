// Housekeeping - scheduled store maintenance

use crate::error::Result;
use crate::port::{HousekeepingConfig, Maintenance};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Runs periodic maintenance (terminal-job purge, VACUUM) in the background.
pub struct HousekeepingScheduler {
    maintenance: Arc<dyn Maintenance>,
    config: HousekeepingConfig,
    interval_hours: u64,
}

impl HousekeepingScheduler {
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        config: HousekeepingConfig,
        interval_hours: u64,
    ) -> Self {
        Self {
            maintenance,
            config,
            interval_hours,
        }
    }

    /// Run the housekeeping loop. Should be spawned in tokio::spawn.
    pub async fn run(self) {
        info!(
            interval_hours = self.interval_hours,
            retention_days = self.config.terminal_job_retention_days,
            "Housekeeping scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.interval_hours * 3600));
        // The first tick fires immediately; skip it so startup stays fast.
        tick.tick().await;

        loop {
            tick.tick().await;

            info!("Running scheduled housekeeping...");
            match self.maintenance.run_full(&self.config).await {
                Ok(stats) => {
                    info!(
                        db_size_mb = stats.db_size_mb,
                        job_count = stats.job_count,
                        terminal_jobs = stats.terminal_job_count,
                        "Scheduled housekeeping completed"
                    );
                }
                Err(e) => {
                    error!(error = ?e, "Scheduled housekeeping failed");
                }
            }
        }
    }

    /// Run housekeeping immediately (manual trigger).
    pub async fn run_now(&self) -> Result<()> {
        info!("Running manual housekeeping...");
        let stats = self.maintenance.run_full(&self.config).await?;
        info!(
            db_size_mb = stats.db_size_mb,
            job_count = stats.job_count,
            "Manual housekeeping completed"
        );
        Ok(())
    }
}
