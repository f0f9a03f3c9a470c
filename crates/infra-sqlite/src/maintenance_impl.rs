// SQLite Maintenance Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

use padron_core::error::{AppError, Result};
use padron_core::port::{Maintenance, StoreStats, TimeProvider};
use std::sync::Arc;

pub struct SqliteMaintenance {
    pool: SqlitePool,
    clock: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, clock: Arc<dyn TimeProvider>) -> Self {
        Self { pool, clock }
    }

    async fn db_size_bytes(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page size: {}", e)))?;

        Ok(page_count * page_size)
    }
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        let size_before = self.db_size_bytes().await? as f64 / (1024.0 * 1024.0);

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("VACUUM failed: {}", e)))?;

        let size_after = self.db_size_bytes().await? as f64 / (1024.0 * 1024.0);
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn purge_terminal_jobs(&self, retention_days: i64) -> Result<i64> {
        let now = self.clock.now_millis();
        let cutoff_time = now - retention_days * 24 * 60 * 60 * 1000;

        info!(
            retention_days = retention_days,
            cutoff_time = cutoff_time,
            "Purging terminal jobs"
        );

        let result = sqlx::query(
            r#"
            DELETE FROM lookup_jobs
            WHERE state IN ('COMPLETED', 'FAILED')
              AND completed_at IS NOT NULL
              AND completed_at < ?
            "#,
        )
        .bind(cutoff_time)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Job purge failed: {}", e)))?;

        let deleted = result.rows_affected() as i64;
        info!(deleted_jobs = deleted, "Terminal job purge completed");
        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<StoreStats> {
        let db_size_bytes = self.db_size_bytes().await?;

        let freelist_count: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get freelist count: {}", e)))?;

        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get page count: {}", e)))?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lookup_jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let terminal_job_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lookup_jobs WHERE state IN ('COMPLETED', 'FAILED')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let citizen_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM citizens")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(StoreStats {
            db_size_mb: db_size_bytes as f64 / (1024.0 * 1024.0),
            db_size_bytes,
            job_count,
            terminal_job_count,
            citizen_count,
            fragmentation_percent: if page_count == 0 {
                0.0
            } else {
                freelist_count as f64 / page_count as f64 * 100.0
            },
        })
    }
}
