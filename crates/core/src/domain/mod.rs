// Domain Layer - Entities and invariants

pub mod document;
pub mod error;
pub mod job;
pub mod record;

pub use document::{normalize_document, validate_document};
pub use error::{DomainError, Result as DomainResult};
pub use job::{FailureKind, JobError, JobId, JobState, LookupJob};
pub use record::{CitizenRecord, ElectoralRecord};
