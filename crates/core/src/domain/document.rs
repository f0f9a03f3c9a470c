// Document number handling
//
// Documents arrive from spreadsheets and web forms with dots, spaces and
// stray whitespace ("1.083.432.108"). Normalization happens once at the
// boundary; everything past the scheduler assumes a normalized value.

use crate::domain::error::{DomainError, Result};

const MIN_DOCUMENT_LEN: usize = 4;
const MAX_DOCUMENT_LEN: usize = 12;

/// Strip separators and surrounding whitespace from a raw document number.
pub fn normalize_document(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '.' | ' ' | '-'))
        .collect()
}

/// Validate a normalized document number: digits only, bounded length.
pub fn validate_document(document: &str) -> Result<()> {
    if document.is_empty() {
        return Err(DomainError::InvalidDocument("empty document".to_string()));
    }
    if !document.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::InvalidDocument(format!(
            "document must contain digits only: {}",
            document
        )));
    }
    if document.len() < MIN_DOCUMENT_LEN || document.len() > MAX_DOCUMENT_LEN {
        return Err(DomainError::InvalidDocument(format!(
            "document length {} outside {}..={}",
            document.len(),
            MIN_DOCUMENT_LEN,
            MAX_DOCUMENT_LEN
        )));
    }
    Ok(())
}
