// SQLite RecordStore Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;

use padron_core::domain::{CitizenRecord, ElectoralRecord};
use padron_core::error::{AppError, Result};
use padron_core::port::RecordStore;

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find(&self, document: &str) -> Result<Option<CitizenRecord>> {
        let row = sqlx::query_as::<_, CitizenRow>("SELECT * FROM citizens WHERE document = ?")
            .bind(document)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(|r| r.into_citizen()))
    }

    async fn upsert(
        &self,
        document: &str,
        record: &ElectoralRecord,
        fetched_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO citizens (
                document, full_name, department, municipality,
                voting_place, table_number, address, fetched_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document) DO UPDATE SET
                full_name = excluded.full_name,
                department = excluded.department,
                municipality = excluded.municipality,
                voting_place = excluded.voting_place,
                table_number = excluded.table_number,
                address = excluded.address,
                fetched_at = excluded.fetched_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document)
        .bind(&record.full_name)
        .bind(&record.department)
        .bind(&record.municipality)
        .bind(&record.voting_place)
        .bind(&record.table_number)
        .bind(&record.address)
        .bind(fetched_at)
        .bind(fetched_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn all_documents(&self) -> Result<Vec<String>> {
        let documents: Vec<String> =
            sqlx::query_scalar("SELECT document FROM citizens ORDER BY document ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(documents)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CitizenRow {
    document: String,
    full_name: Option<String>,
    department: Option<String>,
    municipality: Option<String>,
    voting_place: Option<String>,
    table_number: Option<String>,
    address: Option<String>,
    fetched_at: Option<i64>,
    #[allow(dead_code)]
    updated_at: i64,
}

impl CitizenRow {
    fn into_citizen(self) -> CitizenRecord {
        // Electoral data is only meaningful when the core assignment
        // columns are all present
        let electoral = match (
            self.department,
            self.municipality,
            self.voting_place,
            self.table_number,
        ) {
            (Some(department), Some(municipality), Some(voting_place), Some(table_number)) => {
                Some(ElectoralRecord {
                    document: self.document.clone(),
                    full_name: self.full_name,
                    department,
                    municipality,
                    voting_place,
                    table_number,
                    address: self.address,
                })
            }
            _ => None,
        };

        CitizenRecord {
            document: self.document,
            electoral,
            fetched_at: self.fetched_at,
        }
    }
}
