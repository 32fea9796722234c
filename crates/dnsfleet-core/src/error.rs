//! Error types shared by the domain model and collaborator traits.

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::{EntityKind, NodeId, SyncLogId, SyncStatus};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for remote session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Raised when a stored node selector cannot be interpreted.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// Selector text was neither empty nor a JSON array of node ids.
    #[error("malformed node selector")]
    Malformed {
        /// Raw selector text.
        value: String,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Raised when an entity violates a model invariant.
#[derive(Debug, Error)]
pub enum EntityError {
    /// Field failed validation.
    #[error("invalid entity field")]
    Invalid {
        /// Entity kind being validated.
        kind: EntityKind,
        /// Offending field.
        field: &'static str,
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// Entity selector is malformed.
    #[error("invalid entity selector")]
    Selector {
        /// Selector failure.
        #[source]
        source: SelectorError,
    },
}

/// Failures reported by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record was not found.
    #[error("record not found")]
    NotFound {
        /// Record family (`node`, `entity`, `sync_log`).
        record: &'static str,
        /// Missing identifier.
        id: i64,
    },
    /// Another entity of the same kind already owns the natural key.
    #[error("natural key already in use")]
    Conflict {
        /// Entity kind.
        kind: EntityKind,
        /// Conflicting natural key.
        key: String,
    },
    /// Sync log status change is not permitted.
    #[error("invalid sync log transition")]
    InvalidTransition {
        /// Log being updated.
        log_id: SyncLogId,
        /// Status currently stored.
        from: SyncStatus,
        /// Requested status.
        to: SyncStatus,
    },
    /// Update attempted to change an immutable field.
    #[error("immutable field cannot be modified")]
    ImmutableField {
        /// Entity kind.
        kind: EntityKind,
        /// Field name.
        field: &'static str,
    },
    /// Entity failed validation before being stored.
    #[error("entity rejected")]
    Rejected {
        /// Validation failure.
        #[source]
        source: EntityError,
    },
    /// Backend failure (database, serialisation).
    #[error("store backend failure")]
    Backend {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StoreError {
    /// Wrap an arbitrary backend failure.
    pub fn backend(
        operation: &'static str,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

/// Failures reported by remote sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session could not be established.
    #[error("failed to connect to node")]
    Connect {
        /// Target node.
        node_id: NodeId,
        /// Transport diagnostic.
        message: String,
    },
    /// Remote file does not exist.
    #[error("remote file not found")]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },
    /// Remote file operation failed.
    #[error("remote file operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Transport diagnostic.
        message: String,
    },
    /// Remote command exited unsuccessfully.
    #[error("remote command failed")]
    CommandFailed {
        /// Command that was run.
        command: String,
        /// Exit status when the process exited normally.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// Operation exceeded its deadline and was abandoned.
    #[error("remote operation timed out")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
        /// Deadline that expired.
        after: Duration,
    },
}

impl SessionError {
    /// Whether the error reports a missing file.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// One-line description including context fields, used for audit rows.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Connect { node_id, message } => {
                format!("connection error: node {node_id}: {message}")
            }
            Self::NotFound { path } => format!("remote file not found: {}", path.display()),
            Self::Io {
                operation,
                path,
                message,
            } => format!("{operation} {}: {message}", path.display()),
            Self::CommandFailed {
                command,
                status,
                stderr,
            } => match status {
                Some(code) => format!("`{command}` exited with {code}: {}", stderr.trim()),
                None => format!("`{command}` terminated by signal: {}", stderr.trim()),
            },
            Self::Timeout { operation, after } => {
                format!("{operation} timed out after {}s", after.as_secs())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_detail_includes_context() {
        let err = SessionError::Connect {
            node_id: 4,
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "failed to connect to node");
        assert_eq!(err.detail(), "connection error: node 4: connection refused");

        let timeout = SessionError::Timeout {
            operation: "write_file",
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.detail(), "write_file timed out after 30s");
        assert!(!timeout.is_not_found());
        assert!(
            SessionError::NotFound {
                path: PathBuf::from("/etc/smartdns/smartdns.conf")
            }
            .is_not_found()
        );
    }

    #[test]
    fn backend_wraps_source() {
        let err = StoreError::backend("list_nodes", std::io::Error::other("down"));
        assert_eq!(err.to_string(), "store backend failure");
        assert!(Error::source(&err).is_some());
    }
}
