//! Error types for PostgreSQL operations.

use keel_migrate::ReconcileError;
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Catalog rows that cannot be read as expected.
    #[error("introspection error: {0}")]
    Introspection(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an introspection error.
    pub fn introspection(message: impl Into<String>) -> Self {
        Self::Introspection(message.into())
    }

    /// Check if this is a connection error.
    ///
    /// Driver errors without a server-side message (I/O, closed socket)
    /// count as connection errors.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Config(_) => true,
            Self::Postgres(e) => e.is_closed() || e.as_db_error().is_none(),
            Self::Introspection(_) => false,
        }
    }

    /// The server's message for database errors, else the display text.
    pub fn server_message(&self) -> String {
        match self {
            Self::Postgres(e) => match e.as_db_error() {
                Some(db) => db.message().to_string(),
                None => e.to_string(),
            },
            Self::Introspection(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<PgError> for ReconcileError {
    fn from(err: PgError) -> Self {
        if err.is_connection_error() {
            ReconcileError::connection(err.to_string())
        } else {
            ReconcileError::introspection(err.server_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PgError::config("missing host in URL");
        assert_eq!(err.to_string(), "configuration error: missing host in URL");

        let err = PgError::introspection("unknown action 'x'");
        assert_eq!(err.to_string(), "introspection error: unknown action 'x'");
    }

    #[test]
    fn test_error_classification() {
        assert!(PgError::connection("refused").is_connection_error());
        assert!(PgError::config("bad url").is_connection_error());
        assert!(!PgError::introspection("bad row").is_connection_error());
    }

    #[test]
    fn test_error_conversion() {
        let err: ReconcileError = PgError::connection("refused").into();
        assert!(err.is_transient());

        let err: ReconcileError = PgError::introspection("bad row").into();
        assert!(matches!(err, ReconcileError::Introspection(_)));
        assert_eq!(err.message(), "bad row");
    }
}
