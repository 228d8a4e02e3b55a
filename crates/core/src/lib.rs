// OBD Gateway Core - Domain Logic, Ports & Gateway Service
// NO infrastructure dependencies (sockets and RPC live in adapter crates)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
