// Notifier that reports notifications as structured log events

use obd_gateway_core::domain::Notification;
use obd_gateway_core::port::Notifier;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Headless notifier. Keeps the currently displayed notifications so that
/// replacements and cancellations can be logged meaningfully.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    displayed: Mutex<HashMap<i32, Notification>>,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently on display, by ID
    pub fn displayed(&self) -> HashMap<i32, Notification> {
        self.displayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, id: i32, notification: &Notification) {
        let replaced = self
            .displayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, notification.clone())
            .is_some();

        info!(
            notification_id = id,
            title = %notification.title,
            text = %notification.text,
            icon = notification.icon,
            ongoing = notification.ongoing,
            vibrate = notification.vibrate,
            replaced,
            "Notification"
        );
    }

    fn cancel(&self, id: i32) {
        let removed = self
            .displayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        if let Some(notification) = removed {
            info!(notification_id = id, title = %notification.title, "Notification cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_gateway_core::domain::{NotificationBuilder, NOTIFICATION_ID, STATUS_NOTIFICATION_ID};

    #[test]
    fn test_notify_replaces_and_cancel_removes() {
        let notifier = TracingNotifier::new();
        notifier.notify(NOTIFICATION_ID, &NotificationBuilder::new("OBD", "one").build());
        notifier.notify(NOTIFICATION_ID, &NotificationBuilder::new("OBD", "two").build());
        notifier.notify(
            STATUS_NOTIFICATION_ID,
            &NotificationBuilder::new("OBD", "status").build(),
        );

        let displayed = notifier.displayed();
        assert_eq!(displayed.len(), 2);
        assert_eq!(displayed[&NOTIFICATION_ID].text, "two");

        notifier.cancel(NOTIFICATION_ID);
        notifier.cancel(NOTIFICATION_ID);
        assert!(!notifier.displayed().contains_key(&NOTIFICATION_ID));
        assert_eq!(notifier.displayed().len(), 1);
    }
}
