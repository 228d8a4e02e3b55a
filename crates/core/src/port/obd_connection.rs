// OBD Connection Port
// Abstraction over the link to the ELM327 adapter (TCP, Bluetooth RFCOMM, serial)

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Adapter disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(String),
}

/// Opens sessions to the adapter
#[async_trait]
pub trait ObdConnector: Send + Sync {
    /// Open a new session
    ///
    /// # Errors
    /// - TransportError::Connect if the adapter cannot be reached
    async fn connect(&self) -> Result<Box<dyn ObdConnection>, TransportError>;
}

/// An open adapter session. Requests are strictly sequential.
#[async_trait]
pub trait ObdConnection: Send {
    /// Send one command line and return everything the adapter wrote up to
    /// and including its `>` prompt
    async fn send(&mut self, command: &str) -> Result<String, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        responses: HashMap<String, String>,
        failures: HashMap<String, TransportError>,
        refuse_connect: bool,
        connects: usize,
        closes: usize,
        sent: Vec<String>,
    }

    /// Connector whose sessions answer from a fixed script.
    /// Unknown commands answer `NO DATA`.
    #[derive(Clone, Default)]
    pub struct ScriptedConnector {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedConnector {
        pub fn new() -> Self {
            Self::default()
        }

        /// AT commands answer `OK`, reset answers with the ELM327 banner
        pub fn elm327() -> Self {
            let connector = Self::new();
            connector.respond("AT Z", "\r\rELM327 v1.5\r\r>");
            connector
        }

        pub fn respond(&self, command: &str, response: &str) {
            self.script
                .lock()
                .unwrap()
                .responses
                .insert(command.to_string(), response.to_string());
        }

        /// Make `command` fail at the transport level
        pub fn fail(&self, command: &str, error: TransportError) {
            self.script
                .lock()
                .unwrap()
                .failures
                .insert(command.to_string(), error);
        }

        pub fn refuse_connect(&self) {
            self.script.lock().unwrap().refuse_connect = true;
        }

        pub fn connects(&self) -> usize {
            self.script.lock().unwrap().connects
        }

        pub fn closes(&self) -> usize {
            self.script.lock().unwrap().closes
        }

        pub fn sent(&self) -> Vec<String> {
            self.script.lock().unwrap().sent.clone()
        }
    }

    #[async_trait]
    impl ObdConnector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn ObdConnection>, TransportError> {
            let mut script = self.script.lock().unwrap();
            if script.refuse_connect {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            script.connects += 1;
            Ok(Box::new(ScriptedConnection {
                script: Arc::clone(&self.script),
            }))
        }
    }

    struct ScriptedConnection {
        script: Arc<Mutex<Script>>,
    }

    #[async_trait]
    impl ObdConnection for ScriptedConnection {
        async fn send(&mut self, command: &str) -> Result<String, TransportError> {
            let mut script = self.script.lock().unwrap();
            script.sent.push(command.to_string());
            if let Some(error) = script.failures.get(command) {
                return Err(error.clone());
            }
            let response = if command.starts_with("AT") {
                script
                    .responses
                    .get(command)
                    .cloned()
                    .unwrap_or_else(|| "OK\r\r>".to_string())
            } else {
                script
                    .responses
                    .get(command)
                    .cloned()
                    .unwrap_or_else(|| "NO DATA\r\r>".to_string())
            };
            Ok(response)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.script.lock().unwrap().closes += 1;
            Ok(())
        }
    }
}
