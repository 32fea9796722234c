//! Public entry points of the synchronisation engine.

use std::future::Future;

use dnsfleet_core::{
    NodeId, NodeStore, SyncLog, SyncLogFilter, SyncLogId, SyncLogStore, SyncStats, SyncStatus,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::SyncContext;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::health::{HealthProber, HealthReport};
use crate::plan::{EntityChange, SyncRequest};
use crate::queue::{JobQueue, JobStatus, SyncTicket};

/// Accepts sync requests, answers audit queries and probes node health.
///
/// Mutating operations validate their input, enqueue a job and return as
/// soon as it is accepted; the returned [`SyncTicket`] can be awaited for
/// the per-node report.
#[derive(Clone)]
pub struct SyncService {
    ctx: SyncContext,
    queue: JobQueue,
    health: HealthProber,
}

impl SyncService {
    /// Build the engine and spawn its job runner.
    ///
    /// The runner exits once the service and all its clones are dropped.
    #[must_use]
    pub fn start(ctx: SyncContext) -> (Self, JoinHandle<()>) {
        let engine = SyncEngine::new(ctx.clone());
        let (queue, runner) = JobQueue::start(
            engine,
            ctx.settings.queue_capacity,
            ctx.settings.max_concurrent_jobs,
            ctx.metrics.clone(),
            ctx.events.clone(),
        );
        let health = HealthProber::new(ctx.clone());
        (Self { ctx, queue, health }, runner)
    }

    /// Push an entity change to every node it targets (and remove it from
    /// nodes it no longer targets when `previous_selector` is set).
    ///
    /// # Errors
    ///
    /// Fails fast with [`SyncError::Selector`] when the entity's selector is
    /// malformed; queue errors as for [`JobQueue::submit`].
    pub fn sync_entity(&self, change: EntityChange) -> SyncResult<SyncTicket> {
        change.entity.selector().parse()?;
        self.queue.submit(SyncRequest::Entity(change))
    }

    /// Rebuild one node's configuration from the store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NodeNotFound`] for unknown nodes.
    pub async fn resync_node(&self, node_id: NodeId) -> SyncResult<SyncTicket> {
        self.ctx
            .store
            .find_node(node_id)
            .await
            .map_err(SyncError::store("find_node"))?
            .ok_or(SyncError::NodeNotFound { node_id })?;
        self.queue.submit(SyncRequest::Resync { node_id })
    }

    /// Replay a failed audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LogNotFound`] or [`SyncError::NotRetryable`]
    /// when the entry is missing or not `failed`.
    pub async fn retry_sync_log(&self, log_id: SyncLogId) -> SyncResult<SyncTicket> {
        let log = self
            .ctx
            .store
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
        self.queue.submit(SyncRequest::Retry { log_id })
    }

    /// Audit entries matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] on persistence failures.
    pub async fn sync_logs(&self, filter: &SyncLogFilter) -> SyncResult<Vec<SyncLog>> {
        self.ctx
            .store
            .list_logs(filter)
            .await
            .map_err(SyncError::store("list_logs"))
    }

    /// Audit entry counts by status.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] on persistence failures.
    pub async fn sync_stats(&self) -> SyncResult<SyncStats> {
        self.ctx
            .store
            .log_stats()
            .await
            .map_err(SyncError::store("log_stats"))
    }

    /// Status of an accepted job.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] for unknown jobs.
    pub fn job_status(&self, job_id: Uuid) -> SyncResult<JobStatus> {
        self.queue.status(job_id)
    }

    /// Cancel the nodes of a job that have not started.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] for unknown jobs.
    pub fn cancel_job(&self, job_id: Uuid) -> SyncResult<JobStatus> {
        self.queue.cancel(job_id)
    }

    /// Fail every entry left `pending` by a previous process.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] on persistence failures.
    pub async fn recover_interrupted(&self) -> SyncResult<u64> {
        let recovered = self
            .ctx
            .store
            .recover_interrupted()
            .await
            .map_err(SyncError::store("recover_interrupted"))?;
        if recovered > 0 {
            warn!(recovered, "marked interrupted sync attempts as failed");
        } else {
            info!("no interrupted sync attempts found");
        }
        Ok(recovered)
    }

    /// Probe every node once.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when nodes cannot be listed.
    pub async fn probe_health(&self) -> SyncResult<HealthReport> {
        self.health.probe_all().await
    }

    /// Probe the fleet every `health_interval` until `shutdown` resolves.
    pub async fn run_health_loop<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.ctx.settings.health_interval());
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.health.probe_all().await {
                        warn!(error = %err, "health sweep failed");
                    }
                }
            }
        }
        info!("health prober stopped");
    }
}
