// Notifier Port
// The host decides how notifications reach the user (log, desktop, push).

use crate::domain::Notification;

/// Displays and cancels user notifications by ID.
/// Showing a notification under an ID that is already displayed replaces it.
pub trait Notifier: Send + Sync {
    fn notify(&self, id: i32, notification: &Notification);

    fn cancel(&self, id: i32);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum NotifierCall {
        Notify(i32, Notification),
        Cancel(i32),
    }

    /// Records every call in order
    #[derive(Default)]
    pub struct RecordingNotifier {
        calls: Mutex<Vec<NotifierCall>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<NotifierCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Notifications shown, with their IDs
        pub fn shown(&self) -> Vec<(i32, Notification)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    NotifierCall::Notify(id, n) => Some((id, n)),
                    NotifierCall::Cancel(_) => None,
                })
                .collect()
        }

        pub fn cancelled(&self) -> Vec<i32> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    NotifierCall::Cancel(id) => Some(id),
                    NotifierCall::Notify(..) => None,
                })
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, id: i32, notification: &Notification) {
            self.calls
                .lock()
                .unwrap()
                .push(NotifierCall::Notify(id, notification.clone()));
        }

        fn cancel(&self, id: i32) {
            self.calls.lock().unwrap().push(NotifierCall::Cancel(id));
        }
    }
}
