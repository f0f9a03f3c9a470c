// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("A lookup for document {0} is already queued or running")]
    DuplicateInFlight(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
