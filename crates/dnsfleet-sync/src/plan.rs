//! What a single worker run applies to one node.

use std::path::{Path, PathBuf};

use dnsfleet_core::{
    Entity, EntityKind, NewSyncLog, NodeId, NodeSelector, SyncAction, SyncLogId, SyncLogType,
};
use dnsfleet_document::{ManagedEntry, MergeOp, render_entry};
use serde::Serialize;

/// Change applied to one node's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChange {
    /// Insert or replace the entity's directive.
    Upsert(Entity),
    /// Remove every directive with the natural key.
    Remove {
        /// Entity family.
        kind: EntityKind,
        /// Natural key.
        key: String,
        /// Directive that was last applied, when known.
        content: Option<String>,
    },
    /// Rebuild from every enabled entity that targets the node.
    Full,
}

impl NodeChange {
    /// Removal of `entity`.
    #[must_use]
    pub fn remove(entity: &Entity, domain_set_dir: &Path) -> Self {
        Self::Remove {
            kind: entity.kind(),
            key: entity.natural_key(),
            content: Some(render_entry(&ManagedEntry::from_entity(
                entity,
                domain_set_dir,
            ))),
        }
    }

    /// Audit entry opened before the attempt.
    #[must_use]
    pub fn new_log(&self, node_id: NodeId, domain_set_dir: &Path) -> NewSyncLog {
        match self {
            Self::Upsert(entity) => NewSyncLog {
                node_id,
                action: SyncAction::Add,
                log_type: entity.kind().log_type(),
                content: render_entry(&ManagedEntry::from_entity(entity, domain_set_dir)),
                target_key: Some(entity.natural_key()),
            },
            Self::Remove { kind, key, content } => NewSyncLog {
                node_id,
                action: SyncAction::Delete,
                log_type: kind.log_type(),
                content: content.clone().unwrap_or_else(|| format!("{kind} {key}")),
                target_key: Some(key.clone()),
            },
            Self::Full => NewSyncLog {
                node_id,
                action: SyncAction::Add,
                log_type: SyncLogType::FullSync,
                content: "full configuration resync".to_string(),
                target_key: None,
            },
        }
    }

    /// Domain-set list file touched by this change, if any.
    #[must_use]
    pub fn set_file(&self, domain_set_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::Upsert(Entity::DomainSet(set)) => Some(set.file_path(domain_set_dir)),
            Self::Remove {
                kind: EntityKind::DomainSet,
                key,
                ..
            } => Some(domain_set_dir.join(format!("{key}.conf"))),
            _ => None,
        }
    }
}

/// A change to one entity, as submitted by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityChange {
    /// Entity state after the change (the removed entity for deletions).
    pub entity: Entity,
    /// Direction of the change.
    pub op: MergeOp,
    /// Selector stored before the change, when it was retargeted.
    pub previous_selector: Option<NodeSelector>,
}

impl EntityChange {
    /// Insert or update.
    #[must_use]
    pub const fn upsert(entity: Entity) -> Self {
        Self {
            entity,
            op: MergeOp::Upsert,
            previous_selector: None,
        }
    }

    /// Deletion of a stored entity.
    #[must_use]
    pub const fn remove(entity: Entity) -> Self {
        Self {
            entity,
            op: MergeOp::Remove,
            previous_selector: None,
        }
    }

    /// Record the selector the entity had before this change.
    #[must_use]
    pub fn retargeted_from(mut self, previous: NodeSelector) -> Self {
        self.previous_selector = Some(previous);
        self
    }

    /// Whether the entity should end up present on its targets.
    #[must_use]
    pub const fn is_presence(&self) -> bool {
        matches!(self.op, MergeOp::Upsert) && self.entity.enabled()
    }
}

/// Work accepted onto the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Push one entity change to its targets.
    Entity(EntityChange),
    /// Rebuild one node from the store.
    Resync {
        /// Node to rebuild.
        node_id: NodeId,
    },
    /// Replay a failed audit entry.
    Retry {
        /// Entry to replay.
        log_id: SyncLogId,
    },
}

impl SyncRequest {
    /// Label used for job metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Entity(_) => "entity",
            Self::Resync { .. } => "resync",
            Self::Retry { .. } => "retry",
        }
    }

    /// One-line description for events and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Entity(change) => {
                let verb = if change.is_presence() { "apply" } else { "remove" };
                format!("{verb} {}", change.entity.describe())
            }
            Self::Resync { node_id } => format!("resync node {node_id}"),
            Self::Retry { log_id } => format!("retry sync log {log_id}"),
        }
    }
}

/// Final state of one node within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum NodeResult {
    /// Configuration written.
    Succeeded {
        /// Non-fatal problems (skipped backup, failed reload).
        warnings: Vec<String>,
    },
    /// Attempt failed; the audit entry carries the same message.
    Failed {
        /// Failure detail.
        error: String,
    },
    /// Job was cancelled before this node started.
    Cancelled,
}

/// Outcome for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    /// Target node.
    pub node_id: NodeId,
    /// Audit entry, absent when cancelled or when the store rejected it.
    pub log_id: Option<SyncLogId>,
    /// Final state.
    #[serde(flatten)]
    pub result: NodeResult,
}

impl NodeOutcome {
    /// Whether the node reached `success`.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.result, NodeResult::Succeeded { .. })
    }

    /// Failure message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.result {
            NodeResult::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Complete per-node result set of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// One entry per targeted node, ordered by node id.
    pub outcomes: Vec<NodeOutcome>,
}

impl SyncReport {
    /// Nodes that reached `success`.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Nodes that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error().is_some()).count()
    }

    /// Nodes skipped by cancellation.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result == NodeResult::Cancelled)
            .count()
    }

    /// Outcome for `node_id`.
    #[must_use]
    pub fn outcome(&self, node_id: NodeId) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.node_id == node_id)
    }
}
