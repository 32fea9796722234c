//! Event payload types carried across the control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the control plane.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A synchronisation job was accepted onto the queue.
    SyncJobQueued {
        /// Identifier of the accepted job.
        job_id: Uuid,
        /// Short human readable summary of the job.
        description: String,
    },
    /// A synchronisation job finished processing every target node.
    SyncJobFinished {
        /// Identifier of the finished job.
        job_id: Uuid,
        /// Number of nodes that reached `success`.
        succeeded: usize,
        /// Number of nodes that reached `failed`.
        failed: usize,
    },
    /// A per-node attempt started and its audit entry is pending.
    NodeSyncStarted {
        /// Node receiving the change.
        node_id: i64,
        /// Audit log entry tracking the attempt.
        log_id: i64,
    },
    /// A per-node attempt wrote the new configuration.
    NodeSyncSucceeded {
        /// Node that received the change.
        node_id: i64,
        /// Audit log entry tracking the attempt.
        log_id: i64,
    },
    /// A per-node attempt failed.
    NodeSyncFailed {
        /// Node that rejected the change.
        node_id: i64,
        /// Audit log entry tracking the attempt.
        log_id: i64,
        /// Failure message recorded on the audit entry.
        message: String,
    },
    /// The pre-write backup could not be taken but the write continued.
    BackupSkipped {
        /// Node whose backup failed.
        node_id: i64,
        /// Failure detail.
        message: String,
    },
    /// Operator-facing notification about a node.
    Notification {
        /// Node the notification refers to.
        node_id: i64,
        /// Severity of the notification.
        kind: NotificationKind,
        /// Short title.
        title: String,
        /// Longer body text.
        body: String,
    },
    /// A health probe observed a different node status.
    NodeStatusChanged {
        /// Node whose status changed.
        node_id: i64,
        /// Status observed by the probe.
        status: NodeStatus,
    },
    /// Aggregate health of the control plane changed.
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for subscribers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SyncJobQueued { .. } => "sync_job_queued",
            Self::SyncJobFinished { .. } => "sync_job_finished",
            Self::NodeSyncStarted { .. } => "node_sync_started",
            Self::NodeSyncSucceeded { .. } => "node_sync_succeeded",
            Self::NodeSyncFailed { .. } => "node_sync_failed",
            Self::BackupSkipped { .. } => "backup_skipped",
            Self::Notification { .. } => "notification",
            Self::NodeStatusChanged { .. } => "node_status_changed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Envelope wrapping an event with metadata used for replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned by the bus.
    pub id: EventId,
    /// Time the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Reachability state of a managed resolver host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Never probed.
    #[default]
    Unknown,
    /// Reachable with the resolver daemon active.
    Online,
    /// Unreachable over the transport.
    Offline,
    /// Reachable but the resolver daemon is not running.
    Stopped,
    /// Probe produced an unexpected result.
    Error,
}

impl NodeStatus {
    /// Stable lowercase label used in storage and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Parse a stored label; unrecognised values map to `Unknown`.
    #[must_use]
    pub fn from_label(value: &str) -> Self {
        match value {
            "online" => Self::Online,
            "offline" => Self::Offline,
            "stopped" => Self::Stopped,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// All statuses, in display order.
    pub const ALL: [Self; 5] = [
        Self::Unknown,
        Self::Online,
        Self::Offline,
        Self::Stopped,
        Self::Error,
    ];
}

/// Severity attached to operator notifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The change reached the node.
    Success,
    /// The change did not reach the node.
    Failure,
    /// Something degraded but the operation continued.
    Warning,
}
