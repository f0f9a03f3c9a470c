// SQLite JobStore Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;

use padron_core::domain::{
    ElectoralRecord, FailureKind, JobError, JobId, JobState, LookupJob,
};
use padron_core::error::{AppError, Result};
use padron_core::port::{JobCounts, JobStore};

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE constraint failed - with the partial index
                        // on active documents this is a concurrent lookup
                        AppError::Conflict(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => {
                        AppError::Database(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &LookupJob) -> Result<()> {
        let result_json = job
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO lookup_jobs (
                id, document, priority, state,
                attempts, max_attempts, last_error_kind, last_error_message,
                result, created_at, started_at, completed_at,
                eligible_at, execution_time_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.document)
        .bind(job.priority)
        .bind(job.state.to_string())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.last_error.as_ref().map(|e| e.kind.to_string()))
        .bind(job.last_error.as_ref().map(|e| e.message.clone()))
        .bind(result_json)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.eligible_at)
        .bind(job.execution_time_ms)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<LookupJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM lookup_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|r| r.into_job()).transpose()
    }

    async fn update(&self, job: &LookupJob) -> Result<()> {
        let result_json = job
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE lookup_jobs
            SET state = ?, attempts = ?, last_error_kind = ?, last_error_message = ?,
                result = ?, started_at = ?, completed_at = ?,
                eligible_at = ?, execution_time_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(job.state.to_string())
        .bind(job.attempts)
        .bind(job.last_error.as_ref().map(|e| e.kind.to_string()))
        .bind(job.last_error.as_ref().map(|e| e.message.clone()))
        .bind(result_json)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.eligible_at)
        .bind(job.execution_time_ms)
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_active_by_document(&self, document: &str) -> Result<Option<LookupJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM lookup_jobs
            WHERE document = ? AND state IN ('QUEUED', 'RUNNING')
            LIMIT 1
            "#,
        )
        .bind(document)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| r.into_job()).transpose()
    }

    async fn peek_next(&self, now_millis: i64) -> Result<Option<JobId>> {
        let id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM lookup_jobs
            WHERE state = 'QUEUED' AND eligible_at <= ?
            ORDER BY priority ASC, created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn claim_next(&self, now_millis: i64) -> Result<Option<LookupJob>> {
        // Atomic claim: selection and the QUEUED -> RUNNING transition (with
        // the attempt consumed) happen in one statement
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE lookup_jobs
            SET state = 'RUNNING', started_at = ?, attempts = attempts + 1
            WHERE id = (
                SELECT j.id FROM lookup_jobs j
                WHERE j.state = 'QUEUED' AND j.eligible_at <= ?
                ORDER BY j.priority ASC, j.created_at ASC, j.id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| r.into_job()).transpose()
    }

    async fn counts(&self) -> Result<JobCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM lookup_jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut counts = JobCounts::default();
        for (state, count) in rows {
            match state.as_str() {
                "QUEUED" => counts.queued = count,
                "RUNNING" => counts.running = count,
                "COMPLETED" => counts.completed = count,
                "FAILED" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn find_by_state(&self, state: JobState) -> Result<Vec<LookupJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM lookup_jobs
            WHERE state = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|row| row.into_job()).collect()
    }

    async fn find_by_documents(&self, documents: &[String]) -> Result<Vec<LookupJob>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        // SQLite has no array binds; expand placeholders per document
        let placeholders = vec!["?"; documents.len()].join(", ");
        let sql = format!(
            "SELECT * FROM lookup_jobs WHERE document IN ({}) ORDER BY created_at ASC, id ASC",
            placeholders
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        for document in documents {
            query = query.bind(document);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(|row| row.into_job()).collect()
    }

    async fn delete(&self, id: &JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM lookup_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_state(&self, state: JobState) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lookup_jobs WHERE state = ?")
            .bind(state.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn purge_terminal_older_than(&self, cutoff_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM lookup_jobs
            WHERE state IN ('COMPLETED', 'FAILED')
              AND completed_at IS NOT NULL
              AND completed_at < ?
            "#,
        )
        .bind(cutoff_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    document: String,
    priority: i32,
    state: String,
    attempts: i32,
    max_attempts: i32,
    last_error_kind: Option<String>,
    last_error_message: Option<String>,
    result: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
    eligible_at: i64,
    execution_time_ms: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<LookupJob> {
        let state = match self.state.as_str() {
            "QUEUED" => JobState::Queued,
            "RUNNING" => JobState::Running,
            "COMPLETED" => JobState::Completed,
            "FAILED" => JobState::Failed,
            other => {
                return Err(AppError::Database(format!(
                    "Unknown job state in store: {}",
                    other
                )))
            }
        };

        let last_error = match (self.last_error_kind, self.last_error_message) {
            (Some(kind), message) => Some(JobError {
                kind: parse_failure_kind(&kind),
                message: message.unwrap_or_default(),
            }),
            _ => None,
        };

        let result: Option<ElectoralRecord> = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(LookupJob {
            id: self.id,
            document: self.document,
            priority: self.priority,
            state,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_error,
            result,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            eligible_at: self.eligible_at,
            execution_time_ms: self.execution_time_ms,
        })
    }
}

fn parse_failure_kind(kind: &str) -> FailureKind {
    match kind {
        "NOT_FOUND" => FailureKind::NotFound,
        "CAPTCHA_FAILED" => FailureKind::CaptchaFailed,
        "TIMEOUT" => FailureKind::Timeout,
        "BROWSER_CRASHED" => FailureKind::BrowserCrashed,
        "NETWORK_ERROR" => FailureKind::NetworkError,
        _ => FailureKind::Environment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup() -> SqliteJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobStore::new(pool)
    }

    fn sample_record(document: &str) -> ElectoralRecord {
        ElectoralRecord {
            document: document.to_string(),
            full_name: Some("PEREZ GOMEZ JUAN".to_string()),
            department: "MAGDALENA".to_string(),
            municipality: "SANTA MARTA".to_string(),
            voting_place: "IE LICEO CELEDON".to_string(),
            table_number: "004".to_string(),
            address: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_roundtrip() {
        let store = setup().await;

        let mut job = LookupJob::new("j1", "1083432108", 1_000, 2, 3);
        job.start(2_000).unwrap();
        job.fail(3_000, JobError::new(FailureKind::Timeout, "timed out"))
            .unwrap();
        store.insert(&job).await.unwrap();

        let found = store
            .find_by_id(&"j1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.state, JobState::Failed);
        assert_eq!(found.attempts, 1);
        assert_eq!(found.priority, 2);
        assert_eq!(found.last_error.as_ref().unwrap().kind, FailureKind::Timeout);
        assert_eq!(found.execution_time_ms, Some(1_000));
    }

    #[tokio::test]
    async fn test_result_column_roundtrip() {
        let store = setup().await;

        let mut job = LookupJob::new("j1", "1083432108", 1_000, 0, 3);
        job.start(2_000).unwrap();
        job.complete(3_000, sample_record("1083432108")).unwrap();
        store.insert(&job).await.unwrap();

        let found = store
            .find_by_id(&"j1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.result, Some(sample_record("1083432108")));
    }

    #[tokio::test]
    async fn test_claim_orders_by_priority_then_age() {
        let store = setup().await;

        store
            .insert(&LookupJob::new("a", "1000000001", 1_000, 3, 3))
            .await
            .unwrap();
        store
            .insert(&LookupJob::new("b", "1000000002", 2_000, 1, 3))
            .await
            .unwrap();
        store
            .insert(&LookupJob::new("c", "1000000003", 3_000, 1, 3))
            .await
            .unwrap();

        let first = store.claim_next(10_000).await.unwrap().unwrap();
        assert_eq!(first.id, "b");
        assert_eq!(first.state, JobState::Running);
        assert_eq!(first.attempts, 1);
        assert_eq!(first.started_at, Some(10_000));

        let second = store.claim_next(10_000).await.unwrap().unwrap();
        assert_eq!(second.id, "c");

        let third = store.claim_next(10_000).await.unwrap().unwrap();
        assert_eq!(third.id, "a");

        assert!(store.claim_next(10_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_eligible_at() {
        let store = setup().await;

        let mut job = LookupJob::new("j1", "1083432108", 1_000, 0, 3);
        job.eligible_at = 5_000;
        store.insert(&job).await.unwrap();

        assert!(store.claim_next(4_999).await.unwrap().is_none());
        assert!(store.peek_next(4_999).await.unwrap().is_none());
        assert!(store.claim_next(5_000).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_active_document_unique_index() {
        let store = setup().await;

        store
            .insert(&LookupJob::new("j1", "1083432108", 1_000, 0, 3))
            .await
            .unwrap();

        // Second non-terminal job for the same document violates the index
        let err = store
            .insert(&LookupJob::new("j2", "1083432108", 2_000, 0, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // A terminal job for the document is fine
        let mut done = LookupJob::new("j3", "1083432109", 1_000, 0, 3);
        done.start(2_000).unwrap();
        done.complete(3_000, sample_record("1083432109")).unwrap();
        store.insert(&done).await.unwrap();
        store
            .insert(&LookupJob::new("j4", "1083432109", 4_000, 0, 3))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_counts_and_find_by_documents() {
        let store = setup().await;

        store
            .insert(&LookupJob::new("j1", "1000000001", 1_000, 0, 3))
            .await
            .unwrap();
        let mut failed = LookupJob::new("j2", "1000000002", 1_000, 0, 3);
        failed.start(2_000).unwrap();
        failed
            .fail(3_000, JobError::new(FailureKind::NotFound, "missing"))
            .unwrap();
        store.insert(&failed).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 2);

        let jobs = store
            .find_by_documents(&["1000000002".to_string(), "1000000099".to_string()])
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "j2");

        assert!(store.find_by_documents(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_terminal_older_than() {
        let store = setup().await;

        let mut old = LookupJob::new("j1", "1000000001", 1_000, 0, 3);
        old.start(2_000).unwrap();
        old.complete(3_000, sample_record("1000000001")).unwrap();
        store.insert(&old).await.unwrap();

        let mut recent = LookupJob::new("j2", "1000000002", 1_000, 0, 3);
        recent.start(2_000).unwrap();
        recent
            .fail(9_000, JobError::new(FailureKind::Timeout, "timed out"))
            .unwrap();
        store.insert(&recent).await.unwrap();

        store
            .insert(&LookupJob::new("j3", "1000000003", 1_000, 0, 3))
            .await
            .unwrap();

        assert_eq!(store.purge_terminal_older_than(5_000).await.unwrap(), 1);
        assert!(store.find_by_id(&"j1".to_string()).await.unwrap().is_none());
        assert!(store.find_by_id(&"j2".to_string()).await.unwrap().is_some());
        assert!(store.find_by_id(&"j3".to_string()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_state() {
        let store = setup().await;

        let mut failed = LookupJob::new("j1", "1000000001", 1_000, 0, 3);
        failed.start(2_000).unwrap();
        failed
            .fail(3_000, JobError::new(FailureKind::CaptchaFailed, "captcha"))
            .unwrap();
        store.insert(&failed).await.unwrap();
        store
            .insert(&LookupJob::new("j2", "1000000002", 1_000, 0, 3))
            .await
            .unwrap();

        assert_eq!(store.delete_by_state(JobState::Failed).await.unwrap(), 1);
        assert_eq!(store.counts().await.unwrap().total(), 1);
    }
}
