//! Channel-backed job queue with observable, cancellable jobs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dnsfleet_events::{Event, EventBus};
use dnsfleet_telemetry::Metrics;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::fanout::{CancelFlag, CancelHandle, cancellation};
use crate::plan::{SyncReport, SyncRequest};

/// Finished jobs kept queryable before the oldest are forgotten.
pub const FINISHED_RETENTION: usize = 1024;

/// Lifecycle of an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the runner.
    Queued,
    /// Nodes are being synchronised.
    Running,
    /// Every target node reached a final state.
    Completed {
        /// Nodes that reached `success`.
        succeeded: usize,
        /// Nodes that reached `failed`.
        failed: usize,
        /// Nodes skipped by cancellation.
        cancelled: usize,
    },
    /// The job could not be planned.
    Failed {
        /// Planning failure.
        message: String,
    },
    /// Cancelled before it started.
    Cancelled,
}

impl JobStatus {
    /// Stable label used in metrics and output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the job reached a final state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

struct JobEntry {
    status: JobStatus,
    cancel: CancelHandle,
}

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<Uuid, JobEntry>,
    finished: VecDeque<Uuid>,
}

/// Status table of accepted jobs.
#[derive(Clone, Default)]
pub struct JobRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl JobRegistry {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, job_id: Uuid, cancel: CancelHandle) {
        self.lock().jobs.insert(
            job_id,
            JobEntry {
                status: JobStatus::Queued,
                cancel,
            },
        );
    }

    fn forget(&self, job_id: Uuid) {
        self.lock().jobs.remove(&job_id);
    }

    fn update(&self, job_id: Uuid, status: JobStatus) {
        let mut state = self.lock();
        let finished = status.is_finished();
        if let Some(entry) = state.jobs.get_mut(&job_id) {
            entry.status = status;
        }
        if finished {
            state.finished.push_back(job_id);
            while state.finished.len() > FINISHED_RETENTION {
                if let Some(oldest) = state.finished.pop_front() {
                    state.jobs.remove(&oldest);
                }
            }
        }
    }

    /// Current status of `job_id`.
    #[must_use]
    pub fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.lock().jobs.get(&job_id).map(|entry| entry.status.clone())
    }

    /// Raise the cancellation flag of `job_id` and return its status.
    pub fn cancel(&self, job_id: Uuid) -> Option<JobStatus> {
        let state = self.lock();
        let entry = state.jobs.get(&job_id)?;
        if !entry.status.is_finished() {
            entry.cancel.cancel();
        }
        Some(entry.status.clone())
    }
}

/// Handle to await the final report of an accepted job.
#[derive(Debug)]
pub struct SyncTicket {
    job_id: Uuid,
    reply: oneshot::Receiver<SyncResult<SyncReport>>,
}

impl SyncTicket {
    /// Identifier of the accepted job.
    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Wait for the job to finish.
    ///
    /// # Errors
    ///
    /// Returns the planning error of the job, or [`SyncError::QueueClosed`]
    /// when the runner stopped before answering.
    pub async fn wait(self) -> SyncResult<SyncReport> {
        self.reply.await.unwrap_or(Err(SyncError::QueueClosed))
    }
}

struct Job {
    id: Uuid,
    request: SyncRequest,
    cancel: CancelFlag,
    reply: oneshot::Sender<SyncResult<SyncReport>>,
}

/// Submission side of the queue.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    registry: JobRegistry,
    depth: Arc<AtomicI64>,
    metrics: Metrics,
    events: EventBus,
    capacity: usize,
}

impl JobQueue {
    /// Spawn the runner task that executes up to `max_jobs` jobs at a time.
    ///
    /// The runner stops once every clone of the returned queue is dropped
    /// and the jobs it already started have finished.
    #[must_use]
    pub fn start(
        engine: SyncEngine,
        capacity: usize,
        max_jobs: usize,
        metrics: Metrics,
        events: EventBus,
    ) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Self {
            sender,
            registry: JobRegistry::default(),
            depth: Arc::new(AtomicI64::new(0)),
            metrics,
            events,
            capacity,
        };
        let runner = Runner {
            engine,
            registry: queue.registry.clone(),
            depth: Arc::clone(&queue.depth),
            metrics: queue.metrics.clone(),
            events: queue.events.clone(),
        };
        let handle = tokio::spawn(runner.run(receiver, max_jobs.max(1)));
        (queue, handle)
    }

    /// Accept `request` without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueFull`] when the queue is at capacity and
    /// [`SyncError::QueueClosed`] when the runner has stopped.
    pub fn submit(&self, request: SyncRequest) -> SyncResult<SyncTicket> {
        let job_id = Uuid::new_v4();
        let description = request.describe();
        let kind = request.kind();
        let (cancel_handle, cancel) = cancellation();
        let (reply, receiver) = oneshot::channel();
        self.registry.register(job_id, cancel_handle);

        let job = Job {
            id: job_id,
            request,
            cancel,
            reply,
        };
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(err) = self.sender.try_send(job) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            self.registry.forget(job_id);
            self.metrics.inc_sync_job(kind, "rejected");
            return Err(match err {
                mpsc::error::TrySendError::Full(_) => SyncError::QueueFull {
                    capacity: self.capacity,
                },
                mpsc::error::TrySendError::Closed(_) => SyncError::QueueClosed,
            });
        }
        self.metrics.set_queue_depth(depth);
        info!(%job_id, kind, description = %description, "sync job queued");
        self.events.send(Event::SyncJobQueued {
            job_id,
            description,
        });
        Ok(SyncTicket {
            job_id,
            reply: receiver,
        })
    }

    /// Status of `job_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] for unknown or forgotten jobs.
    pub fn status(&self, job_id: Uuid) -> SyncResult<JobStatus> {
        self.registry
            .status(job_id)
            .ok_or(SyncError::JobNotFound { job_id })
    }

    /// Request cancellation of `job_id`; nodes already running finish.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::JobNotFound`] for unknown or forgotten jobs.
    pub fn cancel(&self, job_id: Uuid) -> SyncResult<JobStatus> {
        self.registry
            .cancel(job_id)
            .ok_or(SyncError::JobNotFound { job_id })
    }
}

struct Runner {
    engine: SyncEngine,
    registry: JobRegistry,
    depth: Arc<AtomicI64>,
    metrics: Metrics,
    events: EventBus,
}

impl Runner {
    async fn run(self, mut receiver: mpsc::Receiver<Job>, max_jobs: usize) {
        let runner = Arc::new(self);
        let permits = Arc::new(Semaphore::new(max_jobs));
        let mut running = JoinSet::new();
        loop {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let Some(job) = receiver.recv().await else {
                break;
            };
            let depth = runner.depth.fetch_sub(1, Ordering::SeqCst) - 1;
            runner.metrics.set_queue_depth(depth.max(0));
            while let Some(joined) = running.try_join_next() {
                log_join(joined);
            }
            let runner = Arc::clone(&runner);
            running.spawn(async move {
                let _permit = permit;
                runner.process(job).await;
            });
        }
        while let Some(joined) = running.join_next().await {
            log_join(joined);
        }
        info!("sync job runner stopped");
    }

    async fn process(&self, job: Job) {
        let kind = job.request.kind();
        if job.cancel.is_cancelled() {
            info!(job_id = %job.id, "sync job cancelled before start");
            self.finish(job.id, kind, JobStatus::Cancelled);
            let _ = job.reply.send(Ok(SyncReport::default()));
            return;
        }

        self.registry.update(job.id, JobStatus::Running);
        let result = self.engine.execute(&job.request, &job.cancel).await;
        let status = match &result {
            Ok(report) => {
                self.events.send(Event::SyncJobFinished {
                    job_id: job.id,
                    succeeded: report.succeeded(),
                    failed: report.failed(),
                });
                info!(
                    job_id = %job.id,
                    succeeded = report.succeeded(),
                    failed = report.failed(),
                    cancelled = report.cancelled(),
                    "sync job finished"
                );
                JobStatus::Completed {
                    succeeded: report.succeeded(),
                    failed: report.failed(),
                    cancelled: report.cancelled(),
                }
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "sync job rejected during planning");
                JobStatus::Failed {
                    message: error_chain(err),
                }
            }
        };
        self.finish(job.id, kind, status);
        if job.reply.send(result).is_err() {
            debug!(job_id = %job.id, "sync ticket dropped before completion");
        }
    }

    fn finish(&self, job_id: Uuid, kind: &'static str, status: JobStatus) {
        self.metrics.inc_sync_job(kind, status.label());
        self.registry.update(job_id, status);
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!(error = %err, "sync job task failed");
    }
}

fn error_chain(err: &SyncError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
