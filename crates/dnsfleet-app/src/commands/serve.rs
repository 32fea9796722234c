//! Long-running mode: recover interrupted attempts, then probe node health
//! on an interval while relaying notifications to the log.

use dnsfleet_events::{Event, EventBus, EventEnvelope, EventId, NotificationKind};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{error, info, warn};

use crate::bootstrap::App;
use crate::error::{AppError, AppResult};

pub(crate) async fn run(app: &App) -> AppResult<()> {
    info!(
        build_sha = dnsfleet_telemetry::build_sha(),
        max_sessions = app.settings.max_concurrent_sessions,
        max_jobs = app.settings.max_concurrent_jobs,
        health_interval_secs = app.settings.health_interval_secs,
        "dnsfleet control plane starting"
    );
    let since = app.events.last_event_id().unwrap_or(0);
    app.service
        .recover_interrupted()
        .await
        .map_err(AppError::sync("recover_interrupted"))?;

    let relay = spawn_notification_relay(&app.events, since);
    app.service.run_health_loop(shutdown_signal()).await;
    relay.abort();

    match app.metrics.render() {
        Ok(text) => info!(metrics = %text, "final metrics"),
        Err(err) => warn!(error = %err, "failed to render metrics"),
    }
    info!("dnsfleet control plane stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

/// Orders relayed events by id and fills gaps from the bus replay ring.
struct NotificationRelay {
    events: EventBus,
    last_seen: EventId,
}

impl NotificationRelay {
    const fn new(events: EventBus, since: EventId) -> Self {
        Self {
            events,
            last_seen: since,
        }
    }

    /// Buffered events newer than the last one relayed.
    fn catch_up(&mut self) -> Vec<EventEnvelope> {
        let backlog = self.events.backlog_since(self.last_seen);
        if let Some(last) = backlog.last() {
            self.last_seen = last.id;
        }
        backlog
    }

    /// Events to relay for one stream item, oldest first.
    fn accept(
        &mut self,
        item: Result<EventEnvelope, BroadcastStreamRecvError>,
    ) -> Vec<EventEnvelope> {
        match item {
            Ok(envelope) if envelope.id <= self.last_seen => Vec::new(),
            Ok(envelope) => {
                self.last_seen = envelope.id;
                vec![envelope]
            }
            Err(err) => {
                let expected = self.last_seen + 1;
                let backlog = self.catch_up();
                let resumed = backlog.first().map_or(expected, |env| env.id);
                warn!(
                    error = %err,
                    lost = resumed.saturating_sub(expected),
                    replayed = backlog.len(),
                    "notification relay lagged; replaying buffered events"
                );
                backlog
            }
        }
    }
}

fn spawn_notification_relay(events: &EventBus, since: EventId) -> JoinHandle<()> {
    let mut stream = events.subscribe();
    let mut relay = NotificationRelay::new(events.clone(), since);
    tokio::spawn(async move {
        for envelope in relay.catch_up() {
            log_notification(envelope);
        }
        while let Some(item) = stream.next().await {
            for envelope in relay.accept(item) {
                log_notification(envelope);
            }
        }
    })
}

fn log_notification(envelope: EventEnvelope) {
    if let Event::Notification {
        node_id,
        kind,
        title,
        body,
    } = envelope.event
    {
        match kind {
            NotificationKind::Failure => {
                error!(node_id, event_id = envelope.id, %title, %body, "notification");
            }
            NotificationKind::Warning => {
                warn!(node_id, event_id = envelope.id, %title, %body, "notification");
            }
            NotificationKind::Success => {
                info!(node_id, event_id = envelope.id, %title, %body, "notification");
            }
        }
    }
}
