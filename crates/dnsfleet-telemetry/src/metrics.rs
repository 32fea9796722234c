//! Prometheus-backed metrics registry and snapshot helpers.

use std::sync::Arc;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
    core::Collector,
};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    sync_attempts_total: IntCounterVec,
    sync_steps_total: IntCounterVec,
    sync_jobs_total: IntCounterVec,
    backup_failures_total: IntCounter,
    active_sessions: IntGauge,
    queue_depth: IntGauge,
    node_health: IntGaugeVec,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Remote sessions currently open.
    pub active_sessions: i64,
    /// Jobs waiting on the sync queue.
    pub queue_depth: i64,
    /// Backups that failed before a write.
    pub backup_failures_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sync_attempts_total = register(
            &registry,
            "sync_attempts_total",
            IntCounterVec::new(
                Opts::new("sync_attempts_total", "Per-node sync attempts by outcome"),
                &["type", "status"],
            ),
        )?;
        let sync_steps_total = register(
            &registry,
            "sync_steps_total",
            IntCounterVec::new(
                Opts::new("sync_steps_total", "Per-node sync steps executed by status"),
                &["step", "status"],
            ),
        )?;
        let sync_jobs_total = register(
            &registry,
            "sync_jobs_total",
            IntCounterVec::new(
                Opts::new("sync_jobs_total", "Sync jobs processed by kind and outcome"),
                &["kind", "outcome"],
            ),
        )?;
        let backup_failures_total = register(
            &registry,
            "backup_failures_total",
            IntCounter::with_opts(Opts::new(
                "backup_failures_total",
                "Configuration backups that could not be taken",
            )),
        )?;
        let active_sessions = register(
            &registry,
            "active_sessions",
            IntGauge::with_opts(Opts::new("active_sessions", "Open remote sessions")),
        )?;
        let queue_depth = register(
            &registry,
            "queue_depth",
            IntGauge::with_opts(Opts::new("queue_depth", "Sync jobs waiting on the queue")),
        )?;
        let node_health = register(
            &registry,
            "node_health",
            IntGaugeVec::new(
                Opts::new("node_health", "Nodes by last observed status"),
                &["status"],
            ),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                sync_attempts_total,
                sync_steps_total,
                sync_jobs_total,
                backup_failures_total,
                active_sessions,
                queue_depth,
                node_health,
            }),
        })
    }

    /// Record the terminal outcome of one per-node attempt.
    pub fn inc_sync_attempt(&self, log_type: &str, status: &str) {
        self.inner
            .sync_attempts_total
            .with_label_values(&[log_type, status])
            .inc();
    }

    /// Record a worker step transition.
    pub fn inc_sync_step(&self, step: &str, status: &str) {
        self.inner
            .sync_steps_total
            .with_label_values(&[step, status])
            .inc();
    }

    /// Record a processed job.
    pub fn inc_sync_job(&self, kind: &str, outcome: &str) {
        self.inner
            .sync_jobs_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Record a failed backup.
    pub fn inc_backup_failure(&self) {
        self.inner.backup_failures_total.inc();
    }

    /// Track a session being opened.
    pub fn session_opened(&self) {
        self.inner.active_sessions.inc();
    }

    /// Track a session being closed.
    pub fn session_closed(&self) {
        self.inner.active_sessions.dec();
    }

    /// Publish the current queue depth.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    /// Publish the number of nodes observed in a status.
    pub fn set_node_health(&self, status: &str, count: i64) {
        self.inner
            .node_health
            .with_label_values(&[status])
            .set(count);
    }

    /// Counter value for a per-node attempt outcome.
    #[must_use]
    pub fn sync_attempts(&self, log_type: &str, status: &str) -> u64 {
        self.inner
            .sync_attempts_total
            .with_label_values(&[log_type, status])
            .get()
    }

    /// Counter value for a worker step transition.
    #[must_use]
    pub fn sync_steps(&self, step: &str, status: &str) -> u64 {
        self.inner
            .sync_steps_total
            .with_label_values(&[step, status])
            .get()
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Produce a snapshot of the headline gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_sessions: self.inner.active_sessions.get(),
            queue_depth: self.inner.queue_depth.get(),
            backup_failures_total: self.inner.backup_failures_total.get(),
        }
    }
}

fn register<C>(
    registry: &Registry,
    name: &'static str,
    collector: prometheus::Result<C>,
) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    let collector =
        collector.map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_gauges_are_rendered() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_sync_attempt("address", "success");
        metrics.inc_sync_step("write", "completed");
        metrics.inc_sync_job("entity", "completed");
        metrics.inc_backup_failure();
        metrics.session_opened();
        metrics.set_queue_depth(3);
        metrics.set_node_health("online", 2);

        let rendered = metrics.render()?;
        assert!(rendered.contains("sync_attempts_total"));
        assert!(rendered.contains("node_health"));
        assert_eq!(metrics.sync_attempts("address", "success"), 1);
        assert_eq!(metrics.sync_steps("write", "completed"), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.queue_depth, 3);
        assert_eq!(snapshot.backup_failures_total, 1);

        metrics.session_closed();
        assert_eq!(metrics.snapshot().active_sessions, 0);
        Ok(())
    }

    #[test]
    fn registries_are_independent() -> Result<()> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.inc_sync_attempt("server", "failed");
        assert_eq!(second.sync_attempts("server", "failed"), 0);
        Ok(())
    }
}
