//! Periodic reachability probing of the fleet.

use std::sync::{Arc, Mutex, PoisonError};

use dnsfleet_core::{Node, NodeId, NodeStatus, NodeStore, SessionError};
use dnsfleet_events::Event;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};

/// Observation for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHealth {
    /// Probed node.
    pub node_id: NodeId,
    /// Node display name.
    pub name: String,
    /// Observed status.
    pub status: NodeStatus,
    /// Whether the status differs from the stored one.
    pub changed: bool,
    /// Probe diagnostic for anything but `online`.
    pub detail: Option<String>,
}

/// Result of one sweep, ordered by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Per-node observations.
    pub nodes: Vec<NodeHealth>,
}

impl HealthReport {
    /// Nodes observed in `status`.
    #[must_use]
    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }

    /// Names of nodes that are not `online`.
    #[must_use]
    pub fn degraded(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.status != NodeStatus::Online)
            .map(|n| n.name.clone())
            .collect()
    }
}

/// Runs the health command on every node with bounded parallelism.
#[derive(Clone)]
pub struct HealthProber {
    ctx: SyncContext,
    last_degraded: Arc<Mutex<Option<Vec<String>>>>,
}

impl HealthProber {
    /// Prober over `ctx`.
    #[must_use]
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            last_degraded: Arc::new(Mutex::new(None)),
        }
    }

    /// Probe every registered node once.
    ///
    /// Status changes are persisted and published; a failed status write is
    /// logged and does not abort the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the node inventory cannot be listed.
    pub async fn probe_all(&self) -> SyncResult<HealthReport> {
        let nodes = self
            .ctx
            .store
            .list_nodes()
            .await
            .map_err(SyncError::store("list_nodes"))?;
        let permits = Arc::new(Semaphore::new(self.ctx.settings.health_concurrency.max(1)));
        let mut probes = JoinSet::new();
        for node in nodes {
            let prober = self.clone();
            let permits = Arc::clone(&permits);
            probes.spawn(async move {
                let _permit = permits.acquire_owned().await;
                prober.probe(node).await
            });
        }

        let mut report = HealthReport::default();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(health) => report.nodes.push(health),
                Err(err) => error!(error = %err, "health probe task aborted"),
            }
        }
        report.nodes.sort_by_key(|health| health.node_id);
        self.publish_summary(&report);
        Ok(report)
    }

    async fn probe(&self, node: Node) -> NodeHealth {
        let (status, detail) = self.observe(&node).await;
        let changed = status != node.status;
        if changed {
            info!(
                node_id = node.id,
                from = node.status.as_str(),
                to = status.as_str(),
                "node status changed"
            );
            if let Err(err) = self.ctx.store.update_node_status(node.id, status).await {
                warn!(node_id = node.id, error = %err, "failed to persist node status");
            }
            self.ctx.events.send(Event::NodeStatusChanged {
                node_id: node.id,
                status,
            });
        }
        NodeHealth {
            node_id: node.id,
            name: node.name,
            status,
            changed,
            detail,
        }
    }

    async fn observe(&self, node: &Node) -> (NodeStatus, Option<String>) {
        let settings = &self.ctx.settings;
        let connect = settings.connect_timeout();
        let opened = tokio::time::timeout(connect, self.ctx.sessions.open(node, connect))
            .await
            .unwrap_or_else(|_| {
                Err(SessionError::Timeout {
                    operation: "connect",
                    after: connect,
                })
            });
        let mut session = match opened {
            Ok(session) => session,
            Err(err) => return (NodeStatus::Offline, Some(err.detail())),
        };
        self.ctx.metrics.session_opened();

        let after = settings.operation_timeout();
        let executed = tokio::time::timeout(after, session.execute(&settings.health_command, after))
            .await
            .unwrap_or_else(|_| {
                Err(SessionError::Timeout {
                    operation: "health_check",
                    after,
                })
            });
        if let Ok(Err(err)) = tokio::time::timeout(after, session.close()).await {
            debug!(node_id = node.id, error = %err.detail(), "failed to close probe session");
        }
        self.ctx.metrics.session_closed();

        match executed {
            Ok(output) if output.success() => (NodeStatus::Online, None),
            Ok(output) => {
                let detail = [output.stdout.trim(), output.stderr.trim()]
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join("; ");
                (NodeStatus::Stopped, Some(detail))
            }
            Err(err) => (NodeStatus::Error, Some(err.detail())),
        }
    }

    fn publish_summary(&self, report: &HealthReport) {
        for status in NodeStatus::ALL {
            let count = i64::try_from(report.count(status)).unwrap_or(i64::MAX);
            self.ctx.metrics.set_node_health(status.as_str(), count);
        }
        let degraded = report.degraded();
        let mut last = self
            .last_degraded
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.as_ref() != Some(&degraded) {
            self.ctx.events.send(Event::HealthChanged {
                degraded: degraded.clone(),
            });
            *last = Some(degraded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(node_id: NodeId, status: NodeStatus) -> NodeHealth {
        NodeHealth {
            node_id,
            name: format!("node-{node_id}"),
            status,
            changed: false,
            detail: None,
        }
    }

    #[test]
    fn report_counts_and_degraded_names() {
        let report = HealthReport {
            nodes: vec![
                health(1, NodeStatus::Online),
                health(2, NodeStatus::Offline),
                health(3, NodeStatus::Stopped),
            ],
        };
        assert_eq!(report.count(NodeStatus::Online), 1);
        assert_eq!(report.count(NodeStatus::Error), 0);
        assert_eq!(report.degraded(), vec!["node-2", "node-3"]);
    }
}
