// Application Layer - Gateway service and device backends

pub mod backend;
pub mod gateway;

// Re-exports
pub use backend::{GatewayBackend, MockGatewayBackend, ObdBackendConfig, ObdGatewayBackend};
pub use gateway::{GatewayService, GatewayStats};
