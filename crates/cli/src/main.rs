//! obdctl - Command-line client for the OBD gateway daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "obdctl")]
#[command(about = "OBD gateway CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "OBD_GATEWAY_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue an OBD command (e.g. "01 0C" or "AT RV")
    Query {
        command: String,

        /// Display name for the job
        #[arg(short, long)]
        name: Option<String>,

        /// Wait for the job to finish and print its result
        #[arg(short, long)]
        wait: bool,

        /// Seconds to wait with --wait
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Show the latest state of a job
    Job {
        job_id: u64,
    },

    /// Show gateway status
    Status,

    /// Open the OBD connection
    Start,

    /// Close the OBD connection and clear pending jobs
    Stop,
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
struct QueuedJob {
    job_id: u64,
    state: String,
    command: String,
}

#[derive(Deserialize)]
struct JobView {
    job_id: Option<u64>,
    name: String,
    command: String,
    state: String,
    value: Option<String>,
    error: Option<String>,
}

#[derive(Tabled)]
struct JobRow {
    job_id: String,
    name: String,
    command: String,
    state: String,
    result: String,
}

impl From<JobView> for JobRow {
    fn from(view: JobView) -> Self {
        Self {
            job_id: view.job_id.map(|id| id.to_string()).unwrap_or_default(),
            name: view.name,
            command: view.command,
            result: view.error.or(view.value).unwrap_or_default(),
            state: view.state,
        }
    }
}

fn is_terminal(state: &str) -> bool {
    matches!(state, "FINISHED" | "EXECUTION_ERROR" | "QUEUE_ERROR")
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

async fn fetch_job(url: &str, job_id: u64) -> Result<JobView> {
    let result = call_rpc(url, "obd.job.v1", json!({ "job_id": job_id })).await?;
    Ok(serde_json::from_value(result)?)
}

fn print_job(view: JobView) {
    let state = match view.state.as_str() {
        "FINISHED" => view.state.green(),
        "EXECUTION_ERROR" | "QUEUE_ERROR" => view.state.red(),
        _ => view.state.yellow(),
    };
    println!("  {} {}", "State:".bold(), state);
    println!();
    println!("{}", Table::new(vec![JobRow::from(view)]));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            command,
            name,
            wait,
            timeout,
        } => {
            let params = json!({
                "command": command,
                "name": name,
            });

            let result = call_rpc(&cli.rpc_url, "obd.queue_job.v1", params).await?;
            let queued: QueuedJob = serde_json::from_value(result)?;
            let job_id = queued.job_id;

            if queued.state == "QUEUE_ERROR" {
                println!("{}", "✗ Job could not be queued".red().bold());
            } else {
                println!("{}", "✓ Job queued".green().bold());
            }
            println!();
            println!("{}", Table::new(vec![queued]));

            if wait {
                let deadline = Instant::now() + Duration::from_secs(timeout);
                loop {
                    let view = fetch_job(&cli.rpc_url, job_id).await?;
                    if is_terminal(&view.state) {
                        println!();
                        print_job(view);
                        break;
                    }
                    if Instant::now() >= deadline {
                        anyhow::bail!("Job {} still {} after {}s", job_id, view.state, timeout);
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }

        Commands::Job { job_id } => {
            let view = fetch_job(&cli.rpc_url, job_id).await?;
            println!("{}", format!("Job {}", job_id).cyan().bold());
            print_job(view);
        }

        Commands::Status => {
            println!("{}", "Gateway Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "gateway.status.v1", json!({})).await {
                Ok(status) => {
                    let connection = if status["running"].as_bool().unwrap_or(false) {
                        "CONNECTED".green()
                    } else {
                        "STOPPED".yellow()
                    };
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "OBD:".bold(), connection);
                    println!("  {} {}", "Worker active:".bold(), status["queue_running"]);
                    println!("  {} {}", "Pending:".bold(), status["pending_jobs"]);
                    println!();
                    println!("  {} {}", "Queued:".bold(), status["queued"]);
                    println!("  {} {}", "Completed:".bold(), status["completed"]);
                    println!("  {} {}", "Failed:".bold(), status["failed"]);
                    println!("  {} {}", "Queue errors:".bold(), status["queue_errors"]);
                    println!("  {} {}", "Cleared:".bold(), status["cleared"]);
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), status["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "OFFLINE".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Start => {
            call_rpc(&cli.rpc_url, "gateway.start.v1", json!({})).await?;
            println!("{}", "✓ OBD connection started".green().bold());
        }

        Commands::Stop => {
            call_rpc(&cli.rpc_url, "gateway.stop.v1", json!({})).await?;
            println!("{}", "✓ OBD connection stopped".green().bold());
        }
    }

    Ok(())
}
