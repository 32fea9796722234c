use dnsfleet_events::NotificationKind;
use serde::Serialize;

use crate::model::NodeId;

/// Operator-facing message about one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Node the message refers to.
    pub node_id: NodeId,
    /// Severity.
    pub kind: NotificationKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub body: String,
}

/// Fire-and-forget delivery of notifications.
///
/// Implementations must not block the caller and must swallow their own
/// delivery failures.
pub trait Notifier: Send + Sync {
    /// Deliver `notification`.
    fn notify(&self, notification: Notification);
}
