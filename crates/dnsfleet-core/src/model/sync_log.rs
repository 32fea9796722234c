use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::node::NodeId;

/// Identifier of a sync audit entry.
pub type SyncLogId = i64;

/// Direction of the change pushed to a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Entity was added or updated.
    Add,
    /// Entity was removed.
    Delete,
}

impl SyncAction {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
        }
    }

    /// Parse a stored label.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "add" => Some(Self::Add),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// What a sync attempt carried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogType {
    /// Address mapping change.
    Address,
    /// Upstream server change.
    Server,
    /// Domain rule change.
    DomainRule,
    /// Nameserver rule change.
    Nameserver,
    /// Domain set change.
    DomainSet,
    /// Whole-document reconciliation.
    FullSync,
}

impl SyncLogType {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Server => "server",
            Self::DomainRule => "domain_rule",
            Self::Nameserver => "nameserver",
            Self::DomainSet => "domain_set",
            Self::FullSync => "full_sync",
        }
    }

    /// Parse a stored label.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "address" => Some(Self::Address),
            "server" => Some(Self::Server),
            "domain_rule" => Some(Self::DomainRule),
            "nameserver" => Some(Self::Nameserver),
            "domain_set" => Some(Self::DomainSet),
            "full_sync" => Some(Self::FullSync),
            _ => None,
        }
    }
}

/// Lifecycle state of an audit entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Attempt in progress.
    Pending,
    /// Attempt wrote the new configuration.
    Success,
    /// Attempt did not reach the node.
    Failed,
}

impl SyncStatus {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored label.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the state is final until an explicit retry.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Permitted transitions: pending to a terminal state, and failed back to
    /// pending for a retry.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Success | Self::Failed) | (Self::Failed, Self::Pending)
        )
    }
}

/// Audit entry for one per-node attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncLog {
    /// Store identifier.
    pub id: SyncLogId,
    /// Node the attempt targeted.
    pub node_id: NodeId,
    /// Change direction.
    pub action: SyncAction,
    /// Change family.
    #[serde(rename = "type")]
    pub log_type: SyncLogType,
    /// Rendered directive(s) or a summary of the change.
    pub content: String,
    /// Natural key of the entity, absent for full reconciliations.
    pub target_key: Option<String>,
    /// Lifecycle state.
    pub status: SyncStatus,
    /// Failure detail for `failed` entries.
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Payload used to open a pending audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncLog {
    /// Node the attempt targets.
    pub node_id: NodeId,
    /// Change direction.
    pub action: SyncAction,
    /// Change family.
    pub log_type: SyncLogType,
    /// Rendered directive(s) or a summary of the change.
    pub content: String,
    /// Natural key of the entity.
    pub target_key: Option<String>,
}

/// Query parameters for listing audit entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncLogFilter {
    /// Restrict to one node.
    pub node_id: Option<NodeId>,
    /// Restrict to one status.
    pub status: Option<SyncStatus>,
    /// Restrict to one change family.
    pub log_type: Option<SyncLogType>,
    /// Maximum number of rows.
    pub limit: Option<u32>,
    /// Rows to skip, newest first.
    pub offset: u32,
}

impl SyncLogFilter {
    /// Default page size when no limit is supplied.
    pub const DEFAULT_LIMIT: u32 = 50;

    /// Whether `log` satisfies the filter predicates (pagination excluded).
    #[must_use]
    pub fn matches(&self, log: &SyncLog) -> bool {
        self.node_id.is_none_or(|id| id == log.node_id)
            && self.status.is_none_or(|status| status == log.status)
            && self.log_type.is_none_or(|kind| kind == log.log_type)
    }

    /// Effective page size.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

/// Audit entry counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStats {
    /// Entries still in progress.
    pub pending: u64,
    /// Successful entries.
    pub success: u64,
    /// Failed entries.
    pub failed: u64,
    /// All entries.
    pub total: u64,
}

impl SyncStats {
    /// Count one entry in `status`.
    pub fn record(&mut self, status: SyncStatus) {
        match status {
            SyncStatus::Pending => self.pending += 1,
            SyncStatus::Success => self.success += 1,
            SyncStatus::Failed => self.failed += 1,
        }
        self.total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_lifecycle() {
        use SyncStatus::{Failed, Pending, Success};
        assert!(Pending.can_transition_to(Success));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Success.can_transition_to(Pending));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Success));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn labels_round_trip() {
        for kind in [
            SyncLogType::Address,
            SyncLogType::Server,
            SyncLogType::DomainRule,
            SyncLogType::Nameserver,
            SyncLogType::DomainSet,
            SyncLogType::FullSync,
        ] {
            assert_eq!(SyncLogType::from_label(kind.as_str()), Some(kind));
        }
        assert_eq!(SyncAction::from_label("delete"), Some(SyncAction::Delete));
        assert_eq!(SyncStatus::from_label("done"), None);
    }

    #[test]
    fn filter_matches_all_predicates() {
        let now = Utc::now();
        let log = SyncLog {
            id: 1,
            node_id: 2,
            action: SyncAction::Add,
            log_type: SyncLogType::Address,
            content: "address /a.com/1.1.1.1".into(),
            target_key: Some("a.com".into()),
            status: SyncStatus::Failed,
            error: Some("connection error".into()),
            created_at: now,
            updated_at: now,
        };
        assert!(SyncLogFilter::default().matches(&log));
        let filter = SyncLogFilter {
            node_id: Some(2),
            status: Some(SyncStatus::Failed),
            ..SyncLogFilter::default()
        };
        assert!(filter.matches(&log));
        let other_node = SyncLogFilter {
            node_id: Some(3),
            ..SyncLogFilter::default()
        };
        assert!(!other_node.matches(&log));
        assert_eq!(filter.effective_limit(), SyncLogFilter::DEFAULT_LIMIT);
    }

    #[test]
    fn stats_count_totals() {
        let mut stats = SyncStats::default();
        stats.record(SyncStatus::Pending);
        stats.record(SyncStatus::Failed);
        stats.record(SyncStatus::Failed);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.total, 3);
    }
}
