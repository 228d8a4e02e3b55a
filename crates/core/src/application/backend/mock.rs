// Mock Gateway Backend - canned adapter answers for demos and tests

use super::GatewayBackend;
use crate::domain::command::{pid, MODE_CURRENT_DATA};
use crate::domain::{CommandKind, ObdCommand, ObdProtocol, ObdResponse};
use crate::error::{AppError, Result};
use crate::port::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Backend that pretends to be a connected ELM327
#[derive(Debug, Default)]
pub struct MockGatewayBackend {
    started: AtomicBool,
    fail_start: bool,
    delay: Duration,
}

impl MockGatewayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `start` fail as if the adapter were unreachable
    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Simulated time per command
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn canned_response(command: &ObdCommand) -> String {
        let data = match command.kind {
            CommandKind::At if command.raw == "AT Z" => return "ELM327 v1.5\r\r>".to_string(),
            CommandKind::At => return "OK\r\r>".to_string(),
            CommandKind::Mode { .. } => return "NO DATA\r\r>".to_string(),
            CommandKind::Pid { mode, pid: code } if mode == MODE_CURRENT_DATA => match code {
                pid::ENGINE_LOAD => "4D",
                pid::COOLANT_TEMPERATURE => "7B",
                pid::ENGINE_RPM => "1A F8",
                pid::VEHICLE_SPEED => "32",
                pid::INTAKE_AIR_TEMPERATURE => "3C",
                pid::THROTTLE_POSITION => "26",
                pid::AMBIENT_AIR_TEMPERATURE => "3A",
                _ => return "NO DATA\r\r>".to_string(),
            },
            CommandKind::Pid { .. } => return "NO DATA\r\r>".to_string(),
        };
        format!("{} {}\r\r>", command.raw.replacen("01", "41", 1), data)
    }
}

#[async_trait]
impl GatewayBackend for MockGatewayBackend {
    async fn start(&self) -> Result<()> {
        if self.fail_start {
            return Err(TransportError::Connect("mock adapter unreachable".to_string()).into());
        }
        self.started.store(true, Ordering::SeqCst);
        debug!("Mock OBD session started");
        Ok(())
    }

    fn init_commands(&self) -> Vec<ObdCommand> {
        vec![
            ObdCommand::reset(),
            ObdCommand::echo_off(),
            ObdCommand::select_protocol(ObdProtocol::Auto),
            ObdCommand::ambient_air_temperature(),
        ]
    }

    async fn execute(&self, command: &ObdCommand) -> Result<ObdResponse> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(AppError::NotConnected);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let raw = Self::canned_response(command);
        Ok(ObdResponse::parse(command, &raw)?)
    }

    async fn is_connected(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
