// Port Layer - Interfaces for external dependencies

pub mod notifier;
pub mod obd_connection;
pub mod state_listener;
pub mod time_provider;

// Re-exports
pub use notifier::Notifier;
pub use obd_connection::{ObdConnection, ObdConnector, TransportError};
pub use state_listener::StateListener;
pub use time_provider::TimeProvider;
