//! Padron CLI - Command-line interface for the Padron query engine

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9343";

#[derive(Parser)]
#[command(name = "padron")]
#[command(about = "Padron electoral registry query engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "PADRON_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a document (cached record or scheduled job)
    Lookup {
        /// Citizen document number
        document: String,

        /// Poll until the job settles
        #[arg(long)]
        wait: bool,
    },

    /// Show the status of one job
    Status {
        /// Job ID
        job_id: String,
    },

    /// Submit a batch of documents from a file (one per line)
    Batch {
        /// Path to the document list
        file: std::path::PathBuf,
    },

    /// Re-fetch every document in the record store
    RefreshAll,

    /// Show queue, worker and breaker statistics
    Stats,

    /// Pause the worker pool (in-flight fetches finish)
    Pause,

    /// Resume the worker pool
    Resume,

    /// Retry a failed job, or all failed jobs
    Retry {
        /// Job ID (omit with --all-failed)
        job_id: Option<String>,

        /// Retry every failed job
        #[arg(long)]
        all_failed: bool,
    },

    /// Delete a queued/failed job, or all failed jobs
    Delete {
        /// Job ID (omit with --all-failed)
        job_id: Option<String>,

        /// Delete every failed job
        #[arg(long)]
        all_failed: bool,
    },

    /// Purge terminal jobs older than the retention window
    Purge {
        /// Retention in days
        #[arg(long, default_value = "7")]
        days: i64,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct RecordRow {
    document: String,
    department: String,
    municipality: String,
    voting_place: String,
    table_number: String,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn record_row(record: &serde_json::Value) -> Option<RecordRow> {
    serde_json::from_value(record.clone()).ok()
}

fn print_record(record: &serde_json::Value) {
    if let Some(row) = record_row(record) {
        println!("{}", Table::new(vec![row]));
    }
    if let Some(name) = record.get("full_name").and_then(|v| v.as_str()) {
        println!("  {} {}", "Name:".bold(), name);
    }
}

fn print_job_status(status: &serde_json::Value) {
    let state = status["state"].as_str().unwrap_or("?");
    let state_colored = match state {
        "COMPLETED" => state.green().bold(),
        "FAILED" => state.red().bold(),
        "RUNNING" => state.yellow().bold(),
        _ => state.normal().bold(),
    };

    println!("  {} {}", "State:".bold(), state_colored);
    println!(
        "  {} {}/{}",
        "Attempts:".bold(),
        status["attempts"],
        status["max_attempts"]
    );
    if let Some(ms) = status["execution_time_ms"].as_i64() {
        println!("  {} {} ms", "Last attempt:".bold(), ms);
    }
    if let Some(error) = status.get("error").filter(|e| !e.is_null()) {
        println!(
            "  {} {} - {}",
            "Error:".bold(),
            error["kind"].as_str().unwrap_or("?").red(),
            error["message"].as_str().unwrap_or("")
        );
    }
    if let Some(record) = status.get("result").filter(|r| !r.is_null()) {
        println!();
        print_record(record);
    }
}

fn print_bulk_result(result: &serde_json::Value) {
    println!("  {} {}", "Total:".bold(), result["total"]);
    println!("  {} {}", "Found in store:".bold(), result["found_in_store"]);
    println!("  {} {}", "Enqueued:".bold(), result["enqueued"]);
    println!("  {} {}", "Already in flight:".bold(), result["in_flight"]);
    println!("  {} {}", "Errors:".bold(), result["errors"]);

    if let Some(failures) = result["failures"].as_array() {
        for failure in failures {
            println!(
                "    {} row {}: {} ({})",
                "✗".red(),
                failure["row"],
                failure["document"].as_str().unwrap_or("?"),
                failure["reason"].as_str().unwrap_or("?")
            );
        }
    }
}

/// Client-side poll with exponential backoff.
async fn wait_for_job(url: &str, job_id: &str) -> Result<serde_json::Value> {
    let mut delay = Duration::from_millis(500);
    loop {
        let status = call_rpc(url, "lookup.status.v1", json!({ "job_id": job_id })).await?;
        let state = status["state"].as_str().unwrap_or("?");
        if state == "COMPLETED" || state == "FAILED" {
            return Ok(status);
        }
        eprintln!("  ... {} (attempt {})", state, status["attempts"]);
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(10));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Lookup { document, wait } => {
            let result = call_rpc(
                &cli.rpc_url,
                "lookup.submit.v1",
                json!({ "document": document }),
            )
            .await?;

            if let Some(record) = result.get("record").filter(|r| !r.is_null()) {
                println!("{}", "✓ Served from record store".green().bold());
                println!();
                print_record(record);
                return Ok(());
            }

            let job_id = result["job_id"].as_str().unwrap_or_default().to_string();
            if result["already_in_flight"].as_bool().unwrap_or(false) {
                println!(
                    "{}",
                    format!("• Lookup already in flight (job {})", job_id).yellow()
                );
            } else {
                println!("{}", format!("✓ Job scheduled: {}", job_id).green().bold());
            }

            if wait {
                let status = wait_for_job(&cli.rpc_url, &job_id).await?;
                println!();
                print_job_status(&status);
            } else {
                println!("  Poll with: padron status {}", job_id);
            }
        }

        Commands::Status { job_id } => {
            let status =
                call_rpc(&cli.rpc_url, "lookup.status.v1", json!({ "job_id": job_id })).await?;
            println!("{}", format!("Job {}", job_id).cyan().bold());
            println!();
            print_job_status(&status);
        }

        Commands::Batch { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let documents: Vec<String> = content
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();

            println!(
                "{}",
                format!("Submitting {} documents...", documents.len())
                    .cyan()
                    .bold()
            );

            let result = call_rpc(
                &cli.rpc_url,
                "bulk.submit.v1",
                json!({ "documents": documents }),
            )
            .await?;

            println!();
            print_bulk_result(&result);
            println!();
            println!("  Progress: padron stats");
        }

        Commands::RefreshAll => {
            println!("{}", "Refreshing every stored record...".cyan().bold());
            let result = call_rpc(&cli.rpc_url, "bulk.refresh.v1", json!({})).await?;
            println!();
            print_bulk_result(&result);
        }

        Commands::Stats => {
            println!("{}", "Padron Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "queue.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {}", "Queue".bold());
                    println!("    Queued:    {}", stats["queued"]);
                    println!("    Running:   {}", stats["running"]);
                    println!("    Completed: {}", stats["completed"]);
                    println!("    Failed:    {}", stats["failed"]);
                    println!("    Total:     {}", stats["total"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "OFFLINE".red());
                    println!("  {} {}", "Error:".bold(), e);
                    return Ok(());
                }
            }

            if let Ok(stats) = call_rpc(&cli.rpc_url, "workers.stats.v1", json!({})).await {
                println!();
                println!("  {}", "Workers".bold());
                let paused = stats["paused"].as_bool().unwrap_or(false);
                println!(
                    "    State:        {}",
                    if paused { "PAUSED".yellow() } else { "RUNNING".green() }
                );
                println!("    Active:       {}", stats["active_workers"]);
                println!("    Processed:    {}", stats["total_processed"]);
                let rate = stats["success_rate"].as_f64().unwrap_or(0.0);
                println!("    Success rate: {:.1}%", rate * 100.0);
                let avg = stats["average_execution_time_ms"].as_f64().unwrap_or(0.0);
                println!("    Avg fetch:    {:.0} ms", avg);
            }

            if let Ok(stats) = call_rpc(&cli.rpc_url, "breaker.stats.v1", json!({})).await {
                println!();
                println!("  {}", "Circuit breaker".bold());
                let state = stats["state"].as_str().unwrap_or("?");
                let state_colored = match state {
                    "CLOSED" => state.green(),
                    "OPEN" => state.red(),
                    _ => state.yellow(),
                };
                println!("    State:    {}", state_colored);
                println!("    Failures: {}", stats["failure_count"]);
            }
        }

        Commands::Pause => {
            call_rpc(&cli.rpc_url, "workers.pause.v1", json!({})).await?;
            println!("{}", "✓ Worker pool paused".yellow().bold());
        }

        Commands::Resume => {
            call_rpc(&cli.rpc_url, "workers.resume.v1", json!({})).await?;
            println!("{}", "✓ Worker pool resumed".green().bold());
        }

        Commands::Retry { job_id, all_failed } => match (job_id, all_failed) {
            (_, true) => {
                let result = call_rpc(&cli.rpc_url, "jobs.retryFailed.v1", json!({})).await?;
                println!(
                    "{}",
                    format!("✓ {} failed jobs reset for retry", result["count"])
                        .green()
                        .bold()
                );
            }
            (Some(job_id), false) => {
                call_rpc(&cli.rpc_url, "job.retry.v1", json!({ "job_id": job_id })).await?;
                println!("{}", format!("✓ Job {} reset for retry", job_id).green().bold());
            }
            (None, false) => anyhow::bail!("Provide a job id or --all-failed"),
        },

        Commands::Delete { job_id, all_failed } => match (job_id, all_failed) {
            (_, true) => {
                let result = call_rpc(&cli.rpc_url, "jobs.deleteFailed.v1", json!({})).await?;
                println!(
                    "{}",
                    format!("✓ {} failed jobs deleted", result["count"]).green().bold()
                );
            }
            (Some(job_id), false) => {
                call_rpc(&cli.rpc_url, "job.delete.v1", json!({ "job_id": job_id })).await?;
                println!("{}", format!("✓ Job {} deleted", job_id).green().bold());
            }
            (None, false) => anyhow::bail!("Provide a job id or --all-failed"),
        },

        Commands::Purge { days } => {
            let result = call_rpc(&cli.rpc_url, "admin.purge.v1", json!({ "days": days })).await?;
            println!(
                "{}",
                format!(
                    "✓ {} terminal jobs older than {} days purged",
                    result["count"], days
                )
                .green()
                .bold()
            );
        }
    }

    Ok(())
}
