//! Collaborators shared by every engine component.

use std::sync::Arc;

use dnsfleet_config::SyncSettings;
use dnsfleet_core::{Notifier, SessionFactory, Store};
use dnsfleet_events::EventBus;
use dnsfleet_telemetry::Metrics;

/// Explicitly injected dependencies of the engine.
#[derive(Clone)]
pub struct SyncContext {
    /// Persistence.
    pub store: Arc<dyn Store>,
    /// Remote session factory.
    pub sessions: Arc<dyn SessionFactory>,
    /// Operator notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Lifecycle events.
    pub events: EventBus,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Engine settings.
    pub settings: Arc<SyncSettings>,
}

impl SyncContext {
    /// Bundle the collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        sessions: Arc<dyn SessionFactory>,
        notifier: Arc<dyn Notifier>,
        events: EventBus,
        metrics: Metrics,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            notifier,
            events,
            metrics,
            settings: Arc::new(settings),
        }
    }
}
