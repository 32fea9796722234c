//! Notifier that keeps every delivered notification.

use std::sync::{Mutex, PoisonError};

use dnsfleet_core::{NodeId, Notification, NotificationKind, Notifier};

/// Records notifications for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification delivered so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kinds delivered for `node_id`, in order.
    #[must_use]
    pub fn kinds_for(&self, node_id: NodeId) -> Vec<NotificationKind> {
        self.delivered()
            .into_iter()
            .filter(|notification| notification.node_id == node_id)
            .map(|notification| notification.kind)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
