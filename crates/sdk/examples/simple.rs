//! Simple SDK Example
//!
//! Demonstrates a cached-or-scheduled lookup with polling.
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package padron-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple
//!    ```

use padron_sdk::PadronClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Padron SDK - Simple Example");
    println!("===========================\n");

    println!("1. Connecting to daemon...");
    let client = PadronClient::connect("http://127.0.0.1:9343").await?;
    println!("   ok\n");

    println!("2. Submitting lookup...");
    let lookup = client.submit_lookup("1083432108").await?;

    if let Some(record) = &lookup.record {
        println!("   served from record store:");
        println!("     - department:   {}", record.department);
        println!("     - municipality: {}", record.municipality);
        println!("     - place:        {}", record.voting_place);
        println!("     - mesa:         {}", record.table_number);
        return Ok(());
    }

    let job_id = lookup.job_id.expect("no record and no job id");
    if lookup.already_in_flight {
        println!("   lookup already in flight, observing job {}", job_id);
    } else {
        println!("   job scheduled: {}", job_id);
    }

    println!("\n3. Polling until the job settles...");
    let status = client
        .wait_for_completion(&job_id, Some(std::time::Duration::from_secs(300)))
        .await?;

    println!("   final state: {} after {} attempt(s)", status.state, status.attempts);
    match (status.result, status.error) {
        (Some(record), _) => {
            println!("   {} / {} / mesa {}", record.department, record.municipality, record.table_number);
        }
        (None, Some(error)) => {
            println!("   failed: {} - {}", error.kind, error.message);
        }
        _ => {}
    }

    println!("\n4. Queue stats:");
    let stats = client.queue_stats().await?;
    println!(
        "   queued={} running={} completed={} failed={}",
        stats.queued, stats.running, stats.completed, stats.failed
    );

    Ok(())
}
