//! Errors raised while constructing transports.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for transport construction.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures building a session factory.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Local root directory is missing or not a directory.
    #[error("local session root is not a directory")]
    InvalidRoot {
        /// Offending path.
        path: PathBuf,
    },
    /// Timeout or port settings are unusable.
    #[error("invalid transport option")]
    InvalidOption {
        /// Option name.
        field: &'static str,
        /// Machine-readable reason.
        reason: &'static str,
    },
}
