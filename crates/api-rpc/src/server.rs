//! JSON-RPC Server
//!
//! Serves the gateway API over HTTP JSON-RPC 2.0 on localhost.

use crate::handler::RpcHandler;
use crate::job_board::JobBoard;
use crate::types::{JobRequest, LifecycleRequest, QueueJobRequest, StatusRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use obd_gateway_core::application::GatewayService;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9527;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, gateway: GatewayService, board: Arc<JobBoard>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(gateway, board)),
        }
    }

    /// Start the JSON-RPC server.
    ///
    /// Returns the handle and the bound address (useful with port 0).
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("obd.queue_job.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: QueueJobRequest = params.parse()?;
                    handler.queue_job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("obd.job.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobRequest = params.parse()?;
                    handler.job(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("gateway.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatusRequest = params.parse::<Option<_>>()?.unwrap_or_default();
                    handler.status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("gateway.start.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: LifecycleRequest = params.parse::<Option<_>>()?.unwrap_or_default();
                    handler.start(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("gateway.stop.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: LifecycleRequest = params.parse::<Option<_>>()?.unwrap_or_default();
                    handler.stop(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok((handle, local_addr))
    }
}
