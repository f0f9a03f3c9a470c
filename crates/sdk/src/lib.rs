//! Padron SDK - Rust Client Library
//!
//! Client for the Padron query engine daemon: submit lookups, poll jobs
//! (with the recommended exponential backoff built in), submit batches.
//!
//! # Example
//!
//! ```no_run
//! use padron_sdk::PadronClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PadronClient::connect("http://127.0.0.1:9343").await?;
//!
//!     let lookup = client.submit_lookup("1083432108").await?;
//!     if let Some(record) = lookup.record {
//!         println!("cached: {} mesa {}", record.municipality, record.table_number);
//!     } else if let Some(job_id) = lookup.job_id {
//!         let status = client.wait_for_completion(&job_id, None).await?;
//!         println!("final state: {}", status.state);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::PadronClient;
pub use error::{Result, SdkError};
pub use types::{
    BulkResult, ElectoralRecord, JobErrorInfo, JobStatus, QueueStats, RowFailure,
    SubmitLookupResponse,
};
