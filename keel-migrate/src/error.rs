//! Error types for the reconciliation engine.

use keel_schema::CatalogError;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired schema is malformed. Raised before the database is touched.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Transport failure talking to the database.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database returned metadata that cannot be modelled.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// The delta cannot be ordered. Raised before anything executes.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A statement failed mid-run. Already applied statements stay applied.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The run failed after some statements had already been applied.
    #[error("{source} ({} statement(s) were applied before the failure)", .applied.len())]
    Interrupted {
        /// Statements that ran and stay applied.
        applied: Vec<String>,
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an introspection error.
    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::Introspection(msg.into())
    }

    /// The underlying message, without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Connection(msg) | Self::Introspection(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Whether retrying the whole run could succeed without changes to the
    /// catalog or the database.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Interrupted { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Account for `applied`, statements that ran earlier in the same run.
    ///
    /// A statement failure is renumbered to its position in the whole run;
    /// any other error is wrapped so the applied statements are not lost.
    pub fn after_applied(self, applied: &[String]) -> Self {
        if applied.is_empty() {
            return self;
        }
        match self {
            Self::Migration(failure) => Self::Migration(failure.after_applied(applied)),
            Self::Interrupted {
                applied: later,
                source,
            } => Self::Interrupted {
                applied: applied.iter().cloned().chain(later).collect(),
                source,
            },
            other => Self::Interrupted {
                applied: applied.to_vec(),
                source: Box::new(other),
            },
        }
    }

    /// Statements that ran before the failure and stay applied.
    pub fn applied(&self) -> &[String] {
        match self {
            Self::Migration(failure) => &failure.applied,
            Self::Interrupted { applied, .. } => applied,
            _ => &[],
        }
    }
}

/// Failure of a single statement during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Statement {} of {} failed: {}\n  {}", .index + 1, .total, .message, .statement)]
pub struct MigrationError {
    /// Zero-based index of the failed statement.
    pub index: usize,
    /// Number of statements in the run.
    pub total: usize,
    /// The statement that failed.
    pub statement: String,
    /// Statements applied before the failure, in order.
    pub applied: Vec<String>,
    /// Database error text.
    pub message: String,
}

impl MigrationError {
    /// Number of statements that were never attempted.
    pub fn not_attempted(&self) -> usize {
        self.total.saturating_sub(self.index + 1)
    }

    /// Renumber against a run in which `earlier` were applied first.
    pub fn after_applied(mut self, earlier: &[String]) -> Self {
        self.index += earlier.len();
        self.total += earlier.len();
        self.applied = earlier.iter().cloned().chain(self.applied).collect();
        self
    }
}

/// The delta cannot be turned into an executable order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A foreign key targets a table that will never exist.
    #[error(
        "Foreign key '{constraint}' on '{table}' references '{referenced_table}', which neither exists nor is being created"
    )]
    UnknownReference {
        table: String,
        constraint: String,
        referenced_table: String,
    },

    /// A foreign key targets columns the referenced table will not have.
    #[error(
        "Foreign key '{constraint}' on '{table}' references missing column '{referenced_table}.{column}'"
    )]
    UnknownReferencedColumn {
        table: String,
        constraint: String,
        referenced_table: String,
        column: String,
    },

    /// A table or column cannot be dropped while a surviving table references it.
    #[error("Cannot drop '{table}': still referenced by '{referenced_by}'")]
    DropBlocked { table: String, referenced_by: String },

    /// A column's type or primary-key role cannot change while a surviving
    /// table's foreign key depends on it.
    #[error("Cannot change '{column}': still referenced by '{referenced_by}'")]
    ReferencedColumnChanged { column: String, referenced_by: String },

    /// The remaining operations wait on each other and no cycle breaker applies.
    #[error("Dependency cycle between: {}", .tables.join(", "))]
    CycleDetected { tables: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_error_display() {
        let err = MigrationError {
            index: 1,
            total: 3,
            statement: "ALTER TABLE \"a\" ADD COLUMN \"b\" INTEGER".to_string(),
            applied: vec!["CREATE TABLE \"x\" (\"id\" INTEGER)".to_string()],
            message: "duplicate column name: b".to_string(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Statement 2 of 3 failed: duplicate column name: b"));
        assert!(text.contains("ADD COLUMN"));
        assert_eq!(err.not_attempted(), 1);
    }

    #[test]
    fn test_reconcile_error_from_plan() {
        let err: ReconcileError = PlanError::DropBlocked {
            table: "AcmeA".to_string(),
            referenced_by: "Other".to_string(),
        }
        .into();
        assert!(matches!(err, ReconcileError::Plan(_)));
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Cannot drop 'AcmeA': still referenced by 'Other'"
        );
    }

    #[test]
    fn test_connection_is_transient() {
        assert!(ReconcileError::connection("reset by peer").is_transient());
        assert!(!ReconcileError::introspection("bad type").is_transient());
        assert_eq!(ReconcileError::introspection("bad type").message(), "bad type");
    }

    #[test]
    fn test_cycle_display() {
        let err = PlanError::CycleDetected {
            tables: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(err.to_string(), "Dependency cycle between: A, B");
    }

    #[test]
    fn test_after_applied_renumbers_statement_failure() {
        let failure = MigrationError {
            index: 0,
            total: 2,
            statement: "CREATE TABLE \"b\" (\"id\" INTEGER)".to_string(),
            applied: vec![],
            message: "table b already exists".to_string(),
        };
        let reaped = vec!["DROP TABLE \"old\";".to_string()];
        let err = ReconcileError::from(failure).after_applied(&reaped);

        let ReconcileError::Migration(failure) = &err else {
            panic!("expected a statement failure, got {err:?}");
        };
        assert_eq!(failure.index, 1);
        assert_eq!(failure.total, 3);
        assert_eq!(failure.not_attempted(), 1);
        assert_eq!(err.applied(), reaped.as_slice());
        assert!(err.to_string().starts_with("Statement 2 of 3 failed"));
    }

    #[test]
    fn test_after_applied_wraps_other_errors() {
        let reaped = vec!["DROP TABLE \"old\";".to_string()];
        let err = ReconcileError::connection("reset by peer").after_applied(&reaped);

        assert!(matches!(err, ReconcileError::Interrupted { .. }));
        assert!(err.is_transient());
        assert_eq!(err.applied(), reaped.as_slice());
        assert_eq!(
            err.to_string(),
            "Connection error: reset by peer (1 statement(s) were applied before the failure)"
        );

        let untouched = ReconcileError::introspection("bad type").after_applied(&[]);
        assert!(matches!(untouched, ReconcileError::Introspection(_)));
        assert!(untouched.applied().is_empty());
    }
}
