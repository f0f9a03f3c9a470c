// Electoral Fetcher Port
// Abstraction over the browser-automation layer that drives the external
// registry form. The orchestrator only sees this single capability; how the
// captcha is solved or the result table parsed is the adapter's problem.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ElectoralRecord, FailureKind};

/// Fetch failure classification.
///
/// The adapter decides attributability: `Environment` means the execution
/// environment itself was broken (scraper binary missing, profile dir gone)
/// and the document's attempt budget must not be charged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("document not found in registry: {0}")]
    NotFound(String),

    #[error("captcha challenge failed: {0}")]
    CaptchaFailed(String),

    #[error("fetch timed out after {0}ms")]
    Timeout(i64),

    #[error("browser session crashed: {0}")]
    BrowserCrashed(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("fetch environment unavailable: {0}")]
    Environment(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::NotFound(_) => FailureKind::NotFound,
            FetchError::CaptchaFailed(_) => FailureKind::CaptchaFailed,
            FetchError::Timeout(_) => FailureKind::Timeout,
            FetchError::BrowserCrashed(_) => FailureKind::BrowserCrashed,
            FetchError::NetworkError(_) => FailureKind::NetworkError,
            FetchError::Environment(_) => FailureKind::Environment,
        }
    }

    /// True when the failure is an infrastructure fault that should not
    /// consume the job's attempt budget.
    pub fn is_environment(&self) -> bool {
        matches!(self, FetchError::Environment(_))
    }
}

/// Electoral Fetcher trait
///
/// Implementations:
/// - ScraperCommandFetcher (infra-fetch): delegates to an external scraper
///   process, one session per worker
/// - mocks::ScriptedFetcher: deterministic outcomes for tests
#[async_trait]
pub trait ElectoralFetcher: Send + Sync {
    /// Fetch the electoral record for a document from the external source.
    ///
    /// May take tens of seconds; the caller applies its own hard timeout on
    /// top of whatever the implementation enforces.
    async fn fetch(&self, document: &str) -> Result<ElectoralRecord, FetchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Build a plausible record for a document (tests only)
    pub fn sample_record(document: &str) -> ElectoralRecord {
        ElectoralRecord {
            document: document.to_string(),
            full_name: Some("PEREZ GOMEZ JUAN CARLOS".to_string()),
            department: "MAGDALENA".to_string(),
            municipality: "SANTA MARTA".to_string(),
            voting_place: "IE LICEO CELEDON".to_string(),
            table_number: "007".to_string(),
            address: Some("CRA 5 # 22-08".to_string()),
        }
    }

    /// Fetcher that plays back a scripted sequence of outcomes, then keeps
    /// repeating the last one. Counts calls.
    pub struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<ElectoralRecord, FetchError>>>,
        fallback: Result<ElectoralRecord, FetchError>,
        call_count: Mutex<usize>,
    }

    impl ScriptedFetcher {
        pub fn new(
            script: Vec<Result<ElectoralRecord, FetchError>>,
            fallback: Result<ElectoralRecord, FetchError>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                fallback,
                call_count: Mutex::new(0),
            }
        }

        /// Always succeed with a sample record for the queried document.
        pub fn always_success() -> Self {
            Self::new(vec![], Ok(sample_record("0")))
        }

        /// Always fail with the given error.
        pub fn always_fail(error: FetchError) -> Self {
            Self::new(vec![], Err(error))
        }

        /// Fail `n` times with `error`, then succeed.
        pub fn fail_then_succeed(n: usize, error: FetchError) -> Self {
            Self::new(
                (0..n).map(|_| Err(error.clone())).collect(),
                Ok(sample_record("0")),
            )
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ElectoralFetcher for ScriptedFetcher {
        async fn fetch(&self, document: &str) -> Result<ElectoralRecord, FetchError> {
            *self.call_count.lock().unwrap() += 1;

            let next = self.script.lock().unwrap().pop_front();
            let outcome = next.unwrap_or_else(|| self.fallback.clone());

            // Fill in the queried document on scripted successes
            outcome.map(|mut record| {
                record.document = document.to_string();
                record
            })
        }
    }

    /// Fetcher that panics, for panic-isolation testing.
    pub struct PanickingFetcher;

    #[async_trait]
    impl ElectoralFetcher for PanickingFetcher {
        async fn fetch(&self, _document: &str) -> Result<ElectoralRecord, FetchError> {
            panic!("fetcher blew up");
        }
    }

    /// Fetcher that never resolves, for hard-timeout testing.
    pub struct HangingFetcher;

    #[async_trait]
    impl ElectoralFetcher for HangingFetcher {
        async fn fetch(&self, _document: &str) -> Result<ElectoralRecord, FetchError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }
}
