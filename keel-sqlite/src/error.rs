//! Error types for SQLite operations.

use keel_migrate::ReconcileError;
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata that cannot be read as expected.
    #[error("Introspection error: {0}")]
    Introspection(String),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an introspection error.
    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::Introspection(msg.into())
    }

    /// Whether the connection is gone.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(tokio_rusqlite::Error::ConnectionClosed)
                | Self::Sqlite(tokio_rusqlite::Error::Close(_))
        )
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for ReconcileError {
    fn from(err: SqliteError) -> Self {
        if err.is_closed() {
            return ReconcileError::connection(err.to_string());
        }
        match err {
            SqliteError::Config(msg) => ReconcileError::connection(format!("config: {msg}")),
            SqliteError::Introspection(msg) => ReconcileError::introspection(msg),
            SqliteError::Sqlite(tokio_rusqlite::Error::Rusqlite(e)) => {
                ReconcileError::introspection(e.to_string())
            }
            SqliteError::Sqlite(e) => ReconcileError::introspection(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn test_error_conversion() {
        let err: ReconcileError = SqliteError::Sqlite(tokio_rusqlite::Error::ConnectionClosed).into();
        assert!(err.is_transient());

        let err: ReconcileError = SqliteError::introspection("expression index").into();
        assert!(matches!(err, ReconcileError::Introspection(_)));
        assert_eq!(err.message(), "expression index");
    }
}
