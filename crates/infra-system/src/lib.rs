// OBD Gateway Infrastructure - System Adapters
// Implements: ObdConnector (ELM327 over TCP), Notifier (tracing)

pub mod elm327_tcp;
pub mod tracing_notifier;

pub use elm327_tcp::TcpElm327Connector;
pub use tracing_notifier::TracingNotifier;
