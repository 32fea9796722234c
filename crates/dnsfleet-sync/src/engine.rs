//! Turns accepted requests into per-node tasks and runs them.

use dnsfleet_core::{
    EntityKind, EntityStore, Node, NodeId, NodeStore, StoreError, SyncLog, SyncLogId,
    SyncLogStore, SyncLogType, SyncStatus,
};
use tracing::{info, warn};

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::fanout::{CancelFlag, NodeTask, fan_out};
use crate::locks::NodeLocks;
use crate::plan::{EntityChange, NodeChange, NodeOutcome, NodeResult, SyncReport, SyncRequest};
use crate::reconcile::targets;
use crate::resolver::resolve_targets;
use crate::worker::SyncWorker;

/// Executes [`SyncRequest`]s against the fleet.
#[derive(Clone)]
pub struct SyncEngine {
    ctx: SyncContext,
    worker: SyncWorker,
}

impl SyncEngine {
    /// Engine with its own node lock table.
    #[must_use]
    pub fn new(ctx: SyncContext) -> Self {
        Self::with_locks(ctx, NodeLocks::new())
    }

    /// Engine sharing `locks` with other engines of the process.
    #[must_use]
    pub fn with_locks(ctx: SyncContext, locks: NodeLocks) -> Self {
        let worker = SyncWorker::new(ctx.clone(), locks);
        Self { ctx, worker }
    }

    /// Run `request` to completion and return one outcome per target node.
    ///
    /// # Errors
    ///
    /// Fails only when the request cannot be planned: a malformed selector,
    /// a missing node or audit entry, a non-retryable entry, or a store
    /// failure while planning. Per-node failures are part of the report.
    pub async fn execute(
        &self,
        request: &SyncRequest,
        cancel: &CancelFlag,
    ) -> SyncResult<SyncReport> {
        match request {
            SyncRequest::Entity(change) => {
                let tasks = self.plan_entity(change).await?;
                Ok(self.run(tasks, cancel).await)
            }
            SyncRequest::Resync { node_id } => {
                let node = self.find_node(*node_id).await?;
                Ok(self.run(vec![NodeTask::new(node, NodeChange::Full)], cancel).await)
            }
            SyncRequest::Retry { log_id } => self.retry(*log_id, cancel).await,
        }
    }

    async fn run(&self, tasks: Vec<NodeTask>, cancel: &CancelFlag) -> SyncReport {
        let limit = self.ctx.settings.max_concurrent_sessions;
        fan_out(&self.worker, tasks, limit, cancel).await
    }

    async fn plan_entity(&self, change: &EntityChange) -> SyncResult<Vec<NodeTask>> {
        let store = self.ctx.store.as_ref();
        let dir = self.ctx.settings.domain_set_dir.as_path();
        let entity = &change.entity;
        let current = resolve_targets(store, entity.selector()).await?;

        let node_change = if change.is_presence() {
            NodeChange::Upsert(entity.clone())
        } else {
            NodeChange::remove(entity, dir)
        };
        let mut tasks: Vec<NodeTask> = current
            .iter()
            .cloned()
            .map(|node| NodeTask::new(node, node_change.clone()))
            .collect();

        if let Some(previous) = &change.previous_selector {
            match resolve_targets(store, previous).await {
                Ok(previous) => {
                    let removal = NodeChange::remove(entity, dir);
                    tasks.extend(
                        previous
                            .into_iter()
                            .filter(|node| current.iter().all(|kept| kept.id != node.id))
                            .map(|node| NodeTask::new(node, removal.clone())),
                    );
                }
                Err(SyncError::Selector { source }) => warn!(
                    entity = %entity.describe(),
                    error = %source,
                    "ignoring malformed previous node selector"
                ),
                Err(err) => return Err(err),
            }
        }
        Ok(tasks)
    }

    async fn retry(&self, log_id: SyncLogId, cancel: &CancelFlag) -> SyncResult<SyncReport> {
        let store = self.ctx.store.as_ref();
        let log = store
            .find_log(log_id)
            .await
            .map_err(SyncError::store("find_log"))?
            .ok_or(SyncError::LogNotFound { log_id })?;
        if log.status != SyncStatus::Failed {
            return Err(SyncError::NotRetryable {
                log_id,
                status: log.status,
            });
        }
        let node = store
            .find_node(log.node_id)
            .await
            .map_err(SyncError::store("find_node"))?;
        let change = match &node {
            Some(node) => Some(self.replay_change(&log, node.id).await?),
            None => None,
        };

        let log = store.reopen_log(log_id).await.map_err(|err| match err {
            StoreError::InvalidTransition { .. } => SyncError::NotRetryable {
                log_id,
                status: log.status,
            },
            StoreError::NotFound { .. } => SyncError::LogNotFound { log_id },
            other => SyncError::store("reopen_log")(other),
        })?;
        info!(log_id, node_id = log.node_id, "retrying sync log");

        let (Some(node), Some(change)) = (node, change) else {
            return self.fail_orphan(log).await;
        };
        let task = NodeTask {
            node,
            change,
            log: Some(log),
        };
        Ok(self.run(vec![task], cancel).await)
    }

    /// Current desired state of the entity `log` recorded, for its node.
    async fn replay_change(&self, log: &SyncLog, node_id: NodeId) -> SyncResult<NodeChange> {
        let kind = EntityKind::ALL
            .into_iter()
            .find(|kind| kind.log_type() == log.log_type);
        let (Some(kind), Some(key)) = (kind, log.target_key.as_deref()) else {
            if log.log_type != SyncLogType::FullSync {
                warn!(log_id = log.id, "sync log has no entity key; replaying a full resync");
            }
            return Ok(NodeChange::Full);
        };
        let stored = self
            .ctx
            .store
            .find_by_key(kind, key)
            .await
            .map_err(SyncError::store("find_by_key"))?;
        let dir = self.ctx.settings.domain_set_dir.as_path();
        Ok(match stored {
            Some(entity) if targets(&entity, node_id) => NodeChange::Upsert(entity),
            Some(entity) => NodeChange::remove(&entity, dir),
            None => NodeChange::Remove {
                kind,
                key: key.to_string(),
                content: None,
            },
        })
    }

    async fn fail_orphan(&self, log: SyncLog) -> SyncResult<SyncReport> {
        let message = format!("node {} no longer exists", log.node_id);
        warn!(log_id = log.id, node_id = log.node_id, "retry target node is gone");
        self.ctx
            .store
            .finish_log(log.id, SyncStatus::Failed, Some(message.clone()))
            .await
            .map_err(SyncError::store("finish_log"))?;
        self.ctx
            .metrics
            .inc_sync_attempt(log.log_type.as_str(), SyncStatus::Failed.as_str());
        Ok(SyncReport {
            outcomes: vec![NodeOutcome {
                node_id: log.node_id,
                log_id: Some(log.id),
                result: NodeResult::Failed { error: message },
            }],
        })
    }

    async fn find_node(&self, node_id: NodeId) -> SyncResult<Node> {
        self.ctx
            .store
            .find_node(node_id)
            .await
            .map_err(SyncError::store("find_node"))?
            .ok_or(SyncError::NodeNotFound { node_id })
    }
}
