// Gateway constants (no magic values)
use std::time::Duration;

/// Poll interval while waiting for the queue to drain
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Title of every gateway notification
pub const NOTIFICATION_TITLE: &str = "OBD Gateway";

/// Icon for regular status notifications
pub const ICON_STATUS: i32 = 1;

/// Icon for error notifications
pub const ICON_ERROR: i32 = 2;

/// Error attached to jobs the queue refused
pub const QUEUE_CLOSED_MESSAGE: &str = "job queue is closed";

/// Error attached to pending jobs dropped by stop_service
pub const QUEUE_CLEARED_MESSAGE: &str = "cleared on service stop";
