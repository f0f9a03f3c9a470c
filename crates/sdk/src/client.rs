//! Padron Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{BulkResult, JobStatus, QueueStats, SubmitLookupResponse};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use std::time::Duration;

/// Initial delay between status polls.
const POLL_BASE_DELAY: Duration = Duration::from_millis(500);
/// Cap on the poll backoff.
const POLL_MAX_DELAY: Duration = Duration::from_secs(10);
/// Default overall wait budget for `wait_for_completion`.
const DEFAULT_WAIT_BUDGET: Duration = Duration::from_secs(10 * 60);

/// Padron query engine client
///
/// # Example
///
/// ```no_run
/// use padron_sdk::PadronClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PadronClient::connect("http://127.0.0.1:9343").await?;
/// # Ok(())
/// # }
/// ```
pub struct PadronClient {
    client: HttpClient,
}

impl PadronClient {
    /// Connect to the Padron daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g. `http://127.0.0.1:9343`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url.as_ref())
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Resolve a document: fresh cached record, or a job id to poll.
    pub async fn submit_lookup(&self, document: impl Into<String>) -> Result<SubmitLookupResponse> {
        let mut params = ObjectParams::new();
        params.insert("document", document.into())?;
        Ok(self.client.request("lookup.submit.v1", params).await?)
    }

    /// Poll one job.
    pub async fn job_status(&self, job_id: impl Into<String>) -> Result<JobStatus> {
        let mut params = ObjectParams::new();
        params.insert("job_id", job_id.into())?;
        Ok(self.client.request("lookup.status.v1", params).await?)
    }

    /// Poll a job until it reaches COMPLETED or FAILED.
    ///
    /// Polls with exponential backoff (500ms doubling up to 10s) so a slow
    /// fetch does not get hammered with status requests. `budget` bounds the
    /// total wait (default 10 minutes); on expiry the job keeps running
    /// server-side and `SdkError::PollTimeout` is returned.
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        budget: Option<Duration>,
    ) -> Result<JobStatus> {
        let budget = budget.unwrap_or(DEFAULT_WAIT_BUDGET);
        let deadline = tokio::time::Instant::now() + budget;
        let mut delay = POLL_BASE_DELAY;

        loop {
            let status = self.job_status(job_id).await?;
            if status.is_terminal() {
                return Ok(status);
            }

            if tokio::time::Instant::now() + delay > deadline {
                return Err(SdkError::PollTimeout(job_id.to_string()));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(POLL_MAX_DELAY);
        }
    }

    /// Submit a batch of documents. Fire-and-forget: returns the immediate
    /// reconciliation summary while jobs drain asynchronously.
    pub async fn submit_batch(&self, documents: Vec<String>) -> Result<BulkResult> {
        let mut params = ObjectParams::new();
        params.insert("documents", documents)?;
        Ok(self.client.request("bulk.submit.v1", params).await?)
    }

    /// Queue counts by state.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self
            .client
            .request("queue.stats.v1", ObjectParams::new())
            .await?)
    }
}
