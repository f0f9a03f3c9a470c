// Scraper command fetcher
//
// The registry source has no API - only a browser-rendered form behind a
// captcha. Driving that form lives in an external scraper program (one
// instance per worker); this adapter spawns it per lookup, applies the
// adapter-level timeout, parses its JSON stdout and classifies exit codes
// into the FetchError taxonomy.
//
// Scraper contract:
//   argv:   <command> [base args...] <document>
//   stdout: JSON electoral record on success
//   exit:   0 success, 2 not-found, 3 captcha-failed, 4 network-error,
//           anything else a crashed session

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use padron_core::domain::ElectoralRecord;
use padron_core::port::{ElectoralFetcher, FetchError};

const EXIT_NOT_FOUND: i32 = 2;
const EXIT_CAPTCHA_FAILED: i32 = 3;
const EXIT_NETWORK_ERROR: i32 = 4;

/// Configuration for one scraper session.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Scraper executable.
    pub command: String,
    /// Arguments placed before the document (profile dir, headless flags).
    pub base_args: Vec<String>,
    /// Environment variables allowed through to the child.
    pub env_allowlist: Vec<String>,
    /// Adapter-level timeout; the worker applies its own on top.
    pub timeout: Duration,
}

impl ScraperConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            base_args: vec![],
            env_allowlist: vec!["PATH".to_string(), "HOME".to_string(), "USER".to_string()],
            timeout: Duration::from_secs(80),
        }
    }
}

/// What the scraper prints on success.
#[derive(Debug, Deserialize)]
struct ScraperOutput {
    full_name: Option<String>,
    department: String,
    municipality: String,
    voting_place: String,
    table_number: String,
    address: Option<String>,
}

pub struct ScraperCommandFetcher {
    config: ScraperConfig,
}

impl ScraperCommandFetcher {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    fn filtered_env(&self) -> HashMap<String, String> {
        std::env::vars()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    async fn spawn_and_wait(&self, document: &str) -> Result<std::process::Output, FetchError> {
        let child = Command::new(&self.config.command)
            .args(&self.config.base_args)
            .arg(document)
            .env_clear()
            .envs(self.filtered_env())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out wait drops the output future; make sure the
            // scraper dies with it instead of lingering as a zombie browser
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FetchError::Environment(format!(
                    "failed to spawn scraper {}: {}",
                    self.config.command, e
                ))
            })?;

        match timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(FetchError::Environment(format!(
                "scraper wait failed: {}",
                e
            ))),
            Err(_) => Err(FetchError::Timeout(self.config.timeout.as_millis() as i64)),
        }
    }

    fn classify_exit(output: &std::process::Output) -> FetchError {
        let stderr_tail: String = String::from_utf8_lossy(&output.stderr)
            .lines()
            .last()
            .unwrap_or("")
            .to_string();

        match output.status.code() {
            Some(EXIT_NOT_FOUND) => FetchError::NotFound(stderr_tail),
            Some(EXIT_CAPTCHA_FAILED) => FetchError::CaptchaFailed(stderr_tail),
            Some(EXIT_NETWORK_ERROR) => FetchError::NetworkError(stderr_tail),
            Some(code) => {
                FetchError::BrowserCrashed(format!("scraper exit code {}: {}", code, stderr_tail))
            }
            // Killed by signal
            None => FetchError::BrowserCrashed(format!("scraper killed: {}", stderr_tail)),
        }
    }

    fn parse_output(document: &str, stdout: &[u8]) -> Result<ElectoralRecord, FetchError> {
        let parsed: ScraperOutput = serde_json::from_slice(stdout).map_err(|e| {
            FetchError::BrowserCrashed(format!("unparseable scraper output: {}", e))
        })?;

        Ok(ElectoralRecord {
            document: document.to_string(),
            full_name: parsed.full_name,
            department: parsed.department,
            municipality: parsed.municipality,
            voting_place: parsed.voting_place,
            table_number: parsed.table_number,
            address: parsed.address,
        })
    }
}

#[async_trait]
impl ElectoralFetcher for ScraperCommandFetcher {
    async fn fetch(&self, document: &str) -> Result<ElectoralRecord, FetchError> {
        info!(
            command = %self.config.command,
            document = %document,
            "Starting scraper fetch"
        );

        let output = self.spawn_and_wait(document).await?;

        if !output.status.success() {
            let error = Self::classify_exit(&output);
            warn!(document = %document, error = %error, "Scraper fetch failed");
            return Err(error);
        }

        let record = Self::parse_output(document, &output.stdout)?;
        info!(
            document = %document,
            municipality = %record.municipality,
            table = %record.table_number,
            "Scraper fetch succeeded"
        );
        Ok(record)
    }
}
