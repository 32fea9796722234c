//! Configuration synchronisation engine for a fleet of resolver nodes.
//!
//! A change to a managed entity is resolved to its target nodes and applied
//! to each of them by a [`SyncWorker`]: read the node's configuration, merge
//! the change by natural key, back up, write atomically and record the
//! attempt in the audit log. Fan-out is bounded, failures are isolated per
//! node, and every request runs as an observable, cancellable job on the
//! [`SyncService`] queue.
#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod health;
pub mod locks;
pub mod notify;
pub mod plan;
pub mod queue;
pub mod reconcile;
pub mod resolver;
pub mod service;
pub mod worker;

pub use context::SyncContext;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use fanout::{CancelFlag, CancelHandle, NodeTask, cancellation, fan_out};
pub use health::{HealthProber, HealthReport, NodeHealth};
pub use locks::NodeLocks;
pub use notify::EventBusNotifier;
pub use plan::{EntityChange, NodeChange, NodeOutcome, NodeResult, SyncReport, SyncRequest};
pub use queue::{FINISHED_RETENTION, JobQueue, JobRegistry, JobStatus, SyncTicket};
pub use reconcile::desired_for_node;
pub use resolver::resolve_targets;
pub use service::SyncService;
pub use worker::{CANCELLED, SyncWorker};
