//! CLI error types and result alias.

use keel_migrate::{MigrationError, ReconcileError};
use keel_schema::{CatalogError, ConfigError};
use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Configuration error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    /// Catalog error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    /// Missing or unusable setting
    #[error("Configuration error: {0}")]
    #[diagnostic(code(keel::settings), help("set it in keel.toml or pass it on the command line"))]
    Settings(String),

    /// Database connection error
    #[error("Database error: {0}")]
    #[diagnostic(code(keel::database))]
    Database(String),

    /// Planning or introspection error
    #[error("Reconcile error: {0}")]
    #[diagnostic(code(keel::reconcile))]
    Reconcile(String),

    /// A statement failed mid-run
    #[error("{0}")]
    #[diagnostic(
        code(keel::migration),
        help("statements before the failed one stay applied; fix the cause and run again")
    )]
    Migration(MigrationError),

    /// The run failed after earlier statements were applied
    #[error("Reconcile error: {message}")]
    #[diagnostic(
        code(keel::interrupted),
        help("the applied statements stay applied; fix the cause and run again")
    )]
    Interrupted {
        message: String,
        applied: Vec<String>,
    },
}

impl CliError {
    /// Create a settings error.
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings(message.into())
    }
}

impl From<ReconcileError> for CliError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Catalog(e) => Self::Catalog(e),
            ReconcileError::Migration(e) => Self::Migration(e),
            ReconcileError::Connection(msg) => Self::Database(msg),
            ReconcileError::Interrupted { applied, source } => Self::Interrupted {
                message: source.to_string(),
                applied,
            },
            other => Self::Reconcile(other.to_string()),
        }
    }
}
