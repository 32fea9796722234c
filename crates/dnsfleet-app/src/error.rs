//! # Design
//!
//! - Centralize application-level errors for bootstrap and command handling.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Render operator-facing text and exit codes in one place.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use dnsfleet_core::{EntityError, StoreError};
use dnsfleet_sync::SyncError;
use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Environment configuration was missing.
    #[error("missing environment configuration")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: &'static str,
    },
    /// Settings could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: dnsfleet_config::ConfigError,
    },
    /// Logging or metrics setup failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: dnsfleet_telemetry::TelemetryError,
    },
    /// Database connection or migration failed.
    #[error("database operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: dnsfleet_data::DataError,
    },
    /// A store call made directly by a command failed.
    #[error("store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: StoreError,
    },
    /// The session factory could not be built.
    #[error("transport setup failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Source transport error.
        source: dnsfleet_transport::TransportError,
    },
    /// The sync engine rejected a request.
    #[error("sync request failed")]
    Sync {
        /// Operation identifier.
        operation: &'static str,
        /// Source engine error.
        source: SyncError,
    },
    /// A submitted entity failed validation.
    #[error("entity is invalid")]
    Entity {
        /// Validation failure.
        source: EntityError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// JSON input or output could not be processed.
    #[error("json operation failed")]
    Json {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source serde error.
        source: serde_json::Error,
    },
    /// Command arguments were inconsistent.
    #[error("invalid input")]
    InvalidInput {
        /// Argument name.
        field: &'static str,
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// Some target nodes did not receive the change.
    #[error("sync finished with failed nodes")]
    PartialFailure {
        /// Nodes that failed.
        failed: usize,
        /// Nodes attempted.
        total: usize,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: dnsfleet_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: dnsfleet_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: dnsfleet_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn transport(
        operation: &'static str,
        source: dnsfleet_transport::TransportError,
    ) -> Self {
        Self::Transport { operation, source }
    }

    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { operation, source }
    }

    pub(crate) fn sync(operation: &'static str) -> impl FnOnce(SyncError) -> Self {
        move |source| Self::Sync { operation, source }
    }

    /// Process exit code: 1 for partial sync failures, 2 for rejected
    /// input, 3 for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::PartialFailure { .. } => 1,
            Self::Entity { .. }
            | Self::InvalidInput { .. }
            | Self::Json { .. }
            | Self::Store {
                source: StoreError::NotFound { .. } | StoreError::Conflict { .. },
                ..
            }
            | Self::Sync {
                source:
                    SyncError::Selector { .. }
                    | SyncError::NodeNotFound { .. }
                    | SyncError::LogNotFound { .. }
                    | SyncError::NotRetryable { .. }
                    | SyncError::JobNotFound { .. },
                ..
            } => 2,
            _ => 3,
        }
    }

    /// Operator-facing message including the context fields.
    #[must_use]
    pub fn display_message(&self) -> String {
        let headline = match self {
            Self::MissingEnv { name } => format!("environment variable {name} is not set"),
            Self::Sync { source, .. } => sync_message(source),
            Self::Store {
                source: StoreError::NotFound { record, id },
                ..
            } => format!("{record} {id} not found"),
            Self::Store {
                source: StoreError::Conflict { kind, key },
                ..
            } => format!("another {kind} already uses {key}"),
            Self::Io {
                operation,
                path: Some(path),
                ..
            }
            | Self::Json {
                operation,
                path: Some(path),
                ..
            } => format!("{operation} failed for {}", path.display()),
            Self::InvalidInput { field, reason } => format!("--{field} {reason}"),
            Self::PartialFailure { failed, total } => {
                format!("{failed} of {total} nodes failed to sync")
            }
            other => other.to_string(),
        };
        let cause = match self {
            Self::Sync { source, .. } => sync_cause(source),
            Self::Store {
                source: StoreError::NotFound { .. } | StoreError::Conflict { .. },
                ..
            } => None,
            other => StdError::source(other),
        };
        append_chain(headline, cause)
    }
}

fn append_chain(mut message: String, mut next: Option<&(dyn StdError + 'static)>) -> String {
    while let Some(err) = next {
        message.push_str(": ");
        message.push_str(&err.to_string());
        next = err.source();
    }
    message
}

fn sync_cause(err: &SyncError) -> Option<&(dyn StdError + 'static)> {
    match err {
        SyncError::Selector { source } => source.source(),
        SyncError::Store { source, .. } => source.source(),
        _ => None,
    }
}

fn sync_message(err: &SyncError) -> String {
    match err {
        SyncError::NodeNotFound { node_id } => format!("node {node_id} not found"),
        SyncError::LogNotFound { log_id } => format!("sync log {log_id} not found"),
        SyncError::NotRetryable { log_id, status } => {
            format!(
                "sync log {log_id} is {}; only failed entries can be retried",
                status.as_str()
            )
        }
        SyncError::QueueFull { capacity } => format!("sync queue is full ({capacity} jobs)"),
        SyncError::JobNotFound { job_id } => format!("sync job {job_id} not found"),
        SyncError::Selector { source } => format!("{err}: {source}"),
        SyncError::Store { operation, source } => format!("{operation}: {source}"),
        SyncError::QueueClosed => err.to_string(),
    }
}
