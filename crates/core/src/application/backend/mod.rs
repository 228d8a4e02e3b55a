// Gateway Backend Port - device session hooks driven by the GatewayService
//
// Implementations:
// - ObdGatewayBackend: real ELM327 adapter reached through an ObdConnector
// - MockGatewayBackend: canned responses, no device

pub mod mock;
pub mod obd;

pub use mock::MockGatewayBackend;
pub use obd::{ObdBackendConfig, ObdGatewayBackend};

use crate::domain::{ObdCommand, ObdResponse};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait GatewayBackend: Send + Sync {
    /// Open the device session
    ///
    /// # Errors
    /// - AppError::Transport if the adapter cannot be reached
    async fn start(&self) -> Result<()>;

    /// Commands queued right after a successful start
    fn init_commands(&self) -> Vec<ObdCommand> {
        Vec::new()
    }

    /// Run one command and decode its response
    ///
    /// # Errors
    /// - AppError::NotConnected if no session is open
    /// - AppError::Domain if the adapter answered with an error
    async fn execute(&self, command: &ObdCommand) -> Result<ObdResponse>;

    /// Whether a device session is open. The session can end on its own
    /// when the adapter hangs up or stops answering.
    async fn is_connected(&self) -> bool;

    /// Close the device session. Closing twice is not an error.
    async fn stop(&self) -> Result<()>;
}
