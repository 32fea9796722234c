//! Default notifier publishing onto the event bus.

use dnsfleet_core::{Notification, Notifier};
use dnsfleet_events::{Event, EventBus};
use tracing::debug;

/// Delivers notifications as [`Event::Notification`].
#[derive(Clone)]
pub struct EventBusNotifier {
    events: EventBus,
}

impl EventBusNotifier {
    /// Notifier publishing on `events`.
    #[must_use]
    pub const fn new(events: EventBus) -> Self {
        Self { events }
    }
}

impl Notifier for EventBusNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            node_id,
            kind,
            title,
            body,
        } = notification;
        let id = self.events.send(Event::Notification {
            node_id,
            kind,
            title,
            body,
        });
        debug!(node_id, event_id = id, "notification published");
    }
}
