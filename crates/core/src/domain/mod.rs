// Domain Layer - Pure business logic and entities

pub mod command;
pub mod error;
pub mod job;
pub mod notification;

// Re-exports
pub use command::{CommandKind, ObdCommand, ObdProtocol, ObdResponse};
pub use error::DomainError;
pub use job::{JobId, JobState, JobView, ObdCommandJob};
pub use notification::{
    Notification, NotificationBuilder, NOTIFICATION_ID, STATUS_NOTIFICATION_ID,
};
