//! OBD Gateway - Main Entry Point

mod config;
mod telemetry;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use config::DaemonConfig;
use obd_gateway_api_rpc::server::RpcServerConfig;
use obd_gateway_api_rpc::{JobBoard, RpcServer};
use obd_gateway_core::application::{
    GatewayBackend, GatewayService, MockGatewayBackend, ObdBackendConfig, ObdGatewayBackend,
};
use obd_gateway_core::port::time_provider::SystemTimeProvider;
use obd_gateway_infra_system::{TcpElm327Connector, TracingNotifier};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long queued jobs may keep draining after shutdown starts
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    let _log_guard = telemetry::init_logging(&config)?;
    info!("OBD Gateway v{} starting...", VERSION);

    // 3. Setup dependencies (DI wiring)
    let backend: Arc<dyn GatewayBackend> = if config.mock {
        info!("Using mock OBD backend");
        Arc::new(MockGatewayBackend::new())
    } else {
        info!(
            addr = %config.adapter_addr,
            protocol = ?config.protocol,
            at_timeout_ms = config.at_timeout_ms,
            "Using ELM327 adapter over TCP"
        );
        let connector = Arc::new(TcpElm327Connector::new(
            config.adapter_addr,
            config.adapter_timeout,
        ));
        Arc::new(ObdGatewayBackend::new(
            connector,
            ObdBackendConfig {
                protocol: config.protocol,
                adapter_timeout_ms: config.at_timeout_ms,
            },
        ))
    };

    let gateway = GatewayService::new(
        backend,
        Arc::new(TracingNotifier::new()),
        Arc::new(SystemTimeProvider),
    )?;
    gateway.on_create();

    let board = Arc::new(JobBoard::default());
    gateway.set_context(board.clone());

    // 4. Start JSON-RPC server
    let rpc_config = RpcServerConfig {
        port: config.rpc_port,
        ..Default::default()
    };
    let (rpc_handle, rpc_addr) = RpcServer::new(rpc_config, gateway.bind(), board)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 5. Open the OBD connection; clients can retry with gateway.start.v1
    if config.autostart {
        if let Err(e) = gateway.start_service().await {
            warn!(error = %e, "Autostart failed, waiting for gateway.start.v1");
        }
    }

    info!(rpc_addr = %rpc_addr, "System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    gateway.on_destroy().await;
    if !gateway.wait_until_idle(SHUTDOWN_DRAIN_TIMEOUT).await {
        warn!(
            pending_jobs = gateway.pending_jobs(),
            "Queue did not drain before shutdown"
        );
    }
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;

    info!("Shutdown complete.");
    Ok(())
}
