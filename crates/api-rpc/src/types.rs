//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use obd_gateway_core::application::GatewayStats;
use obd_gateway_core::domain::{JobId, JobState};
use serde::{Deserialize, Serialize};

/// obd.queue_job.v1 - Queue an OBD command
#[derive(Debug, Deserialize)]
pub struct QueueJobRequest {
    /// AT command or hex request, e.g. "01 0C"
    pub command: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJobResponse {
    pub job_id: JobId,
    pub state: JobState,
    pub command: String,
}

/// obd.job.v1 - Latest state of a job
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub job_id: JobId,
}

/// gateway.status.v1 - Service and queue state
#[derive(Debug, Default, Deserialize)]
pub struct StatusRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub queue_running: bool,
    pub queue_empty: bool,
    pub pending_jobs: usize,
    #[serde(flatten)]
    pub stats: GatewayStats,
    pub uptime_seconds: u64,
}

/// gateway.start.v1 / gateway.stop.v1
#[derive(Debug, Default, Deserialize)]
pub struct LifecycleRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleResponse {
    pub running: bool,
}
