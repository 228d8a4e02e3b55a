// OBD Gateway Backend - drives an ELM327 adapter over an ObdConnection

use super::GatewayBackend;
use crate::domain::{ObdCommand, ObdProtocol, ObdResponse};
use crate::error::{AppError, Result};
use crate::port::{ObdConnection, ObdConnector, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default adapter response timeout (62 units of 4ms)
pub const DEFAULT_ADAPTER_TIMEOUT_MS: u32 = 248;

#[derive(Debug, Clone)]
pub struct ObdBackendConfig {
    pub protocol: ObdProtocol,
    /// Passed to the adapter with `AT ST`
    pub adapter_timeout_ms: u32,
}

impl Default for ObdBackendConfig {
    fn default() -> Self {
        Self {
            protocol: ObdProtocol::Auto,
            adapter_timeout_ms: DEFAULT_ADAPTER_TIMEOUT_MS,
        }
    }
}

pub struct ObdGatewayBackend {
    connector: Arc<dyn ObdConnector>,
    config: ObdBackendConfig,
    session: Mutex<Option<Box<dyn ObdConnection>>>,
}

impl ObdGatewayBackend {
    pub fn new(connector: Arc<dyn ObdConnector>, config: ObdBackendConfig) -> Self {
        Self {
            connector,
            config,
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl GatewayBackend for ObdGatewayBackend {
    async fn start(&self) -> Result<()> {
        info!("Connecting to OBD adapter..");
        let connection = self.connector.connect().await?;

        let previous = self.session.lock().await.replace(connection);
        if let Some(mut previous) = previous {
            warn!("Replacing an open OBD session");
            if let Err(e) = previous.close().await {
                debug!(error = %e, "Closing previous session failed");
            }
        }

        info!("Connected to OBD adapter");
        Ok(())
    }

    fn init_commands(&self) -> Vec<ObdCommand> {
        vec![
            ObdCommand::reset(),
            // The first echo-off is often swallowed right after a reset
            ObdCommand::echo_off(),
            ObdCommand::echo_off(),
            ObdCommand::line_feed_off(),
            ObdCommand::timeout(self.config.adapter_timeout_ms),
            ObdCommand::select_protocol(self.config.protocol),
            // Probe the ECU once the protocol is set
            ObdCommand::ambient_air_temperature(),
        ]
    }

    async fn execute(&self, command: &ObdCommand) -> Result<ObdResponse> {
        let mut session = self.session.lock().await;
        let connection = session.as_mut().ok_or(AppError::NotConnected)?;

        debug!(command = %command.raw, "Sending command to adapter");
        let raw = match connection.send(&command.raw).await {
            Ok(raw) => raw,
            Err(e) => {
                // A late or partial answer would be read as the next command's reply
                warn!(command = %command.raw, error = %e, "Dropping OBD session");
                if let Some(mut connection) = session.take() {
                    if e != TransportError::Disconnected {
                        if let Err(close_err) = connection.close().await {
                            debug!(error = %close_err, "Closing broken session failed");
                        }
                    }
                }
                return Err(e.into());
            }
        };
        drop(session);

        Ok(ObdResponse::parse(command, &raw)?)
    }

    async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn stop(&self) -> Result<()> {
        let previous = self.session.lock().await.take();
        if let Some(mut connection) = previous {
            info!("Closing OBD connection");
            connection.close().await?;
        }
        Ok(())
    }
}
