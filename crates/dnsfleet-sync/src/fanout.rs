//! Bounded, failure-isolated fan-out of worker runs.

use std::collections::HashMap;
use std::sync::Arc;

use dnsfleet_core::{Node, SyncLog};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::plan::{NodeChange, NodeOutcome, NodeResult, SyncReport};
use crate::worker::SyncWorker;

/// Requests cancellation of the nodes of a job that have not started yet.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// Flag the job as cancelled.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelFlag(watch::Receiver<bool>);

impl CancelFlag {
    /// A flag that can never be raised.
    #[must_use]
    pub fn never() -> Self {
        let (_, flag) = cancellation();
        flag
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Linked cancellation pair.
#[must_use]
pub fn cancellation() -> (CancelHandle, CancelFlag) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle(Arc::new(sender)), CancelFlag(receiver))
}

/// One node's share of a job.
#[derive(Debug, Clone)]
pub struct NodeTask {
    /// Target node.
    pub node: Node,
    /// Change to apply.
    pub change: NodeChange,
    /// Reopened audit entry to continue instead of opening a new one.
    pub log: Option<SyncLog>,
}

impl NodeTask {
    /// Task that opens its own audit entry.
    #[must_use]
    pub const fn new(node: Node, change: NodeChange) -> Self {
        Self {
            node,
            change,
            log: None,
        }
    }
}

/// Run `tasks` with at most `limit` workers in flight.
///
/// Every task yields exactly one outcome, ordered by node id. A panicking
/// worker is reported as a failure of its own node only; nodes that had not
/// started when `cancel` was raised are reported as cancelled.
pub async fn fan_out(
    worker: &SyncWorker,
    tasks: Vec<NodeTask>,
    limit: usize,
    cancel: &CancelFlag,
) -> SyncReport {
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut running = JoinSet::new();
    let mut owners = HashMap::with_capacity(tasks.len());

    for task in tasks {
        let node_id = task.node.id;
        let worker = worker.clone();
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();
        let handle = running.spawn(async move {
            let permit = permits.acquire_owned().await;
            if permit.is_err() || cancel.is_cancelled() {
                debug!(node_id, "node skipped by cancellation");
                if let Some(log) = &task.log {
                    worker.abandon(node_id, log).await;
                }
                return NodeOutcome {
                    node_id,
                    log_id: task.log.map(|log| log.id),
                    result: NodeResult::Cancelled,
                };
            }
            worker.run(&task.node, &task.change, task.log).await
        });
        owners.insert(handle.id(), node_id);
    }

    let mut report = SyncReport::default();
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(err) => {
                let Some(node_id) = owners.get(&err.id()).copied() else {
                    error!(error = %err, "untracked sync task failed");
                    continue;
                };
                error!(node_id, error = %err, "sync worker task aborted");
                report.outcomes.push(NodeOutcome {
                    node_id,
                    log_id: None,
                    result: NodeResult::Failed {
                        error: format!("worker task aborted: {err}"),
                    },
                });
            }
        }
    }
    report.outcomes.sort_by_key(|outcome| outcome.node_id);
    report
}
