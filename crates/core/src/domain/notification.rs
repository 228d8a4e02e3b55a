// Notification Domain Model

use serde::{Deserialize, Serialize};

/// ID of the service notification; cancelled when the gateway is destroyed
pub const NOTIFICATION_ID: i32 = 1;

/// ID for transient status notifications
pub const STATUS_NOTIFICATION_ID: i32 = 0;

/// UI relaunched when the user taps a notification
pub const MAIN_CONTENT_TARGET: &str = "main";

/// A user-visible notification about gateway state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub text: String,
    pub icon: i32,
    /// Ongoing notifications cannot be dismissed by the user
    pub ongoing: bool,
    pub auto_cancel: bool,
    pub vibrate: bool,
    pub when_millis: i64,
    pub content_target: String,
}

/// Builder for [`Notification`]
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    notification: Notification,
}

impl NotificationBuilder {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            notification: Notification {
                title: title.into(),
                text: text.into(),
                icon: 0,
                ongoing: false,
                auto_cancel: true,
                vibrate: false,
                when_millis: 0,
                content_target: MAIN_CONTENT_TARGET.to_string(),
            },
        }
    }

    pub fn icon(mut self, icon: i32) -> Self {
        self.notification.icon = icon;
        self
    }

    pub fn when(mut self, when_millis: i64) -> Self {
        self.notification.when_millis = when_millis;
        self
    }

    /// Ongoing notifications are never auto-cancelled
    pub fn ongoing(mut self, ongoing: bool) -> Self {
        self.notification.ongoing = ongoing;
        self.notification.auto_cancel = !ongoing;
        self
    }

    pub fn vibrate(mut self, vibrate: bool) -> Self {
        self.notification.vibrate = vibrate;
        self
    }

    pub fn build(self) -> Notification {
        self.notification
    }
}
