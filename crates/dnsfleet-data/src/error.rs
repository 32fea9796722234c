//! Error types for the data access layer.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use dnsfleet_core::StoreError;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug)]
pub enum DataError {
    /// Migration execution failed.
    MigrationFailed {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A database operation failed.
    QueryFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A stored value could not be mapped onto the domain model.
    InvalidColumn {
        /// Column name.
        column: &'static str,
        /// Stored value.
        value: String,
    },
    /// A JSON payload could not be encoded or decoded.
    Payload {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying serde failure.
        source: serde_json::Error,
    },
}

impl DataError {
    /// Operation or column the failure is attributed to.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::MigrationFailed { .. } => "migrate",
            Self::QueryFailed { operation, .. } | Self::Payload { operation, .. } => *operation,
            Self::InvalidColumn { column, .. } => *column,
        }
    }
}

impl Display for DataError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MigrationFailed { .. } => formatter.write_str("migration failed"),
            Self::QueryFailed { .. } => formatter.write_str("database operation failed"),
            Self::InvalidColumn { .. } => formatter.write_str("stored value is not recognised"),
            Self::Payload { .. } => formatter.write_str("entity payload could not be mapped"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MigrationFailed { source } => Some(source),
            Self::QueryFailed { source, .. } => Some(source),
            Self::Payload { source, .. } => Some(source),
            Self::InvalidColumn { .. } => None,
        }
    }
}

impl From<DataError> for StoreError {
    fn from(error: DataError) -> Self {
        Self::backend(error.operation(), error)
    }
}

pub(crate) fn map_query_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_display_and_source() {
        let query = DataError::QueryFailed {
            operation: "list_nodes",
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(query.to_string(), "database operation failed");
        assert!(query.source().is_some());
        assert_eq!(query.operation(), "list_nodes");

        let column = DataError::InvalidColumn {
            column: "status",
            value: "bogus".into(),
        };
        assert_eq!(column.to_string(), "stored value is not recognised");
        assert!(column.source().is_none());
    }

    #[test]
    fn data_errors_become_backend_store_errors() {
        let store: StoreError = DataError::InvalidColumn {
            column: "kind",
            value: "zone".into(),
        }
        .into();
        assert!(matches!(
            store,
            StoreError::Backend {
                operation: "kind",
                ..
            }
        ));
    }
}
