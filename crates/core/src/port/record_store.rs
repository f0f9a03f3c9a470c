// Record Store Port (Interface)
// External persistence of citizen profiles; queried and written by the
// orchestrator, never designed here.

use async_trait::async_trait;

use crate::domain::{CitizenRecord, ElectoralRecord};
use crate::error::Result;

/// Repository interface for citizen profiles
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find a citizen's profile by document
    async fn find(&self, document: &str) -> Result<Option<CitizenRecord>>;

    /// Insert or update a citizen's electoral data after a successful fetch
    async fn upsert(&self, document: &str, record: &ElectoralRecord, fetched_at: i64)
        -> Result<()>;

    /// All documents known to the store (used by refresh-all)
    async fn all_documents(&self) -> Result<Vec<String>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory record store. Counts upserts so tests can assert the
    /// store collaborator was written exactly once.
    pub struct InMemoryRecordStore {
        records: Mutex<HashMap<String, CitizenRecord>>,
        upsert_count: Mutex<usize>,
    }

    impl InMemoryRecordStore {
        pub fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                upsert_count: Mutex::new(0),
            }
        }

        /// Seed a profile with electoral data fetched at `fetched_at`.
        pub fn seed(&self, record: ElectoralRecord, fetched_at: i64) {
            let document = record.document.clone();
            self.records.lock().unwrap().insert(
                document.clone(),
                CitizenRecord {
                    document,
                    electoral: Some(record),
                    fetched_at: Some(fetched_at),
                },
            );
        }

        pub fn upsert_count(&self) -> usize {
            *self.upsert_count.lock().unwrap()
        }
    }

    impl Default for InMemoryRecordStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RecordStore for InMemoryRecordStore {
        async fn find(&self, document: &str) -> Result<Option<CitizenRecord>> {
            Ok(self.records.lock().unwrap().get(document).cloned())
        }

        async fn upsert(
            &self,
            document: &str,
            record: &ElectoralRecord,
            fetched_at: i64,
        ) -> Result<()> {
            *self.upsert_count.lock().unwrap() += 1;
            self.records.lock().unwrap().insert(
                document.to_string(),
                CitizenRecord {
                    document: document.to_string(),
                    electoral: Some(record.clone()),
                    fetched_at: Some(fetched_at),
                },
            );
            Ok(())
        }

        async fn all_documents(&self) -> Result<Vec<String>> {
            let mut documents: Vec<String> =
                self.records.lock().unwrap().keys().cloned().collect();
            documents.sort();
            Ok(documents)
        }
    }
}
