//! Error types for the synchronisation engine.

use dnsfleet_core::{NodeId, SelectorError, StoreError, SyncLogId, SyncStatus};
use thiserror::Error;
use uuid::Uuid;

/// Result alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures that reject a whole request. Per-node failures never surface
/// here; they are recorded on the node's audit entry instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The entity's node selector could not be interpreted.
    #[error("node selector is malformed")]
    Selector {
        /// Selector failure.
        #[source]
        source: SelectorError,
    },
    /// A store operation failed before any node was attempted.
    #[error("store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Referenced node does not exist.
    #[error("node not found")]
    NodeNotFound {
        /// Missing node.
        node_id: NodeId,
    },
    /// Referenced audit entry does not exist.
    #[error("sync log not found")]
    LogNotFound {
        /// Missing entry.
        log_id: SyncLogId,
    },
    /// Only `failed` entries can be retried.
    #[error("sync log is not retryable")]
    NotRetryable {
        /// Entry that was requested.
        log_id: SyncLogId,
        /// Its current status.
        status: SyncStatus,
    },
    /// The job queue has shut down.
    #[error("sync queue is closed")]
    QueueClosed,
    /// The job queue is at capacity.
    #[error("sync queue is full")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },
    /// No job with the given identifier is tracked.
    #[error("sync job not found")]
    JobNotFound {
        /// Requested job.
        job_id: Uuid,
    },
}

impl SyncError {
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { operation, source }
    }
}

impl From<SelectorError> for SyncError {
    fn from(source: SelectorError) -> Self {
        Self::Selector { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnsfleet_core::NodeSelector;
    use std::error::Error as _;

    #[test]
    fn selector_errors_keep_their_source() {
        let source = NodeSelector::from("[1,")
            .parse()
            .expect_err("malformed selector");
        let err = SyncError::from(source);
        assert_eq!(err.to_string(), "node selector is malformed");
        assert!(err.source().is_some());
    }

    #[test]
    fn store_helper_wraps_operation() {
        let err = SyncError::store("find_log")(StoreError::NotFound {
            record: "sync_log",
            id: 4,
        });
        assert!(matches!(
            err,
            SyncError::Store {
                operation: "find_log",
                ..
            }
        ));
    }
}
