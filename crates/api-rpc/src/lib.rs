//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server through which clients queue OBD
//! commands and follow their results.

pub mod error;
pub mod handler;
pub mod job_board;
pub mod server;
pub mod types;

pub use job_board::JobBoard;
pub use server::RpcServer;
