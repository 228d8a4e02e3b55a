//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{code, to_rpc_error};
use crate::job_board::JobBoard;
use crate::types::{
    JobRequest, LifecycleRequest, LifecycleResponse, QueueJobRequest, QueueJobResponse,
    StatusRequest, StatusResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use obd_gateway_core::application::GatewayService;
use obd_gateway_core::domain::{JobView, ObdCommand, ObdCommandJob};
use obd_gateway_core::error::AppError;
use std::sync::Arc;
use tracing::info;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    gateway: GatewayService,
    board: Arc<JobBoard>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(gateway: GatewayService, board: Arc<JobBoard>) -> Self {
        Self {
            gateway,
            board,
            start_time: std::time::Instant::now(),
        }
    }

    /// obd.queue_job.v1
    pub async fn queue_job(
        &self,
        params: QueueJobRequest,
    ) -> Result<QueueJobResponse, ErrorObjectOwned> {
        let name = params
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| params.command.trim().to_ascii_uppercase());
        let command = ObdCommand::raw(name, &params.command)
            .map_err(|e| to_rpc_error(AppError::from(e)))?;

        let view = self.gateway.queue_job(ObdCommandJob::new(command));
        let job_id = view.job_id.ok_or_else(|| {
            to_rpc_error(AppError::Internal("queued job has no id".to_string()))
        })?;
        self.board.record_if_absent(view.clone());

        info!(job_id, command = %view.command, state = %view.state, "Job queued via RPC");

        Ok(QueueJobResponse {
            job_id,
            state: view.state,
            command: view.command,
        })
    }

    /// obd.job.v1
    pub async fn job(&self, params: JobRequest) -> Result<JobView, ErrorObjectOwned> {
        self.board.get(params.job_id).ok_or_else(|| {
            ErrorObjectOwned::owned(
                code::NOT_FOUND,
                format!("Job not found: {}", params.job_id),
                None::<()>,
            )
        })
    }

    /// gateway.status.v1
    pub async fn status(&self, _params: StatusRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        Ok(StatusResponse {
            running: self.gateway.is_running(),
            queue_running: self.gateway.is_queue_running(),
            queue_empty: self.gateway.queue_empty(),
            pending_jobs: self.gateway.pending_jobs(),
            stats: self.gateway.stats(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }

    /// gateway.start.v1
    pub async fn start(
        &self,
        _params: LifecycleRequest,
    ) -> Result<LifecycleResponse, ErrorObjectOwned> {
        self.gateway.start_service().await.map_err(to_rpc_error)?;
        Ok(LifecycleResponse {
            running: self.gateway.is_running(),
        })
    }

    /// gateway.stop.v1
    pub async fn stop(
        &self,
        _params: LifecycleRequest,
    ) -> Result<LifecycleResponse, ErrorObjectOwned> {
        self.gateway.stop_service().await;
        Ok(LifecycleResponse {
            running: self.gateway.is_running(),
        })
    }
}
