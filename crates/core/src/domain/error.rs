// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Adapter reported error for {command}: {message}")]
    AdapterError { command: String, message: String },

    #[error("Unexpected response for {command}: {response}")]
    UnexpectedResponse { command: String, response: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
