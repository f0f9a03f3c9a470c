// Electoral record domain model

use serde::{Deserialize, Serialize};

/// Electoral assignment data scraped from the registry source on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectoralRecord {
    pub document: String,
    pub full_name: Option<String>,
    pub department: String,
    pub municipality: String,
    pub voting_place: String,
    /// Table ("mesa") assignment within the voting place.
    pub table_number: String,
    pub address: Option<String>,
}

/// A citizen's profile in the record store, including any previously
/// fetched electoral data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitizenRecord {
    pub document: String,
    pub electoral: Option<ElectoralRecord>,
    /// Epoch ms of the last successful fetch, None if never fetched.
    pub fetched_at: Option<i64>,
}

impl CitizenRecord {
    /// A record is fresh when it has electoral data fetched within
    /// `max_age_ms` of `now`. Stale or never-fetched records need a job.
    pub fn is_fresh(&self, now_millis: i64, max_age_ms: i64) -> bool {
        match (&self.electoral, self.fetched_at) {
            (Some(_), Some(fetched_at)) => now_millis - fetched_at <= max_age_ms,
            _ => false,
        }
    }
}
