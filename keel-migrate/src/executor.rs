//! Statement-by-statement execution.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{MigrationError, ReconcileResult};

/// Runs one SQL statement at a time.
#[async_trait]
pub trait StatementExecutor: Send {
    /// Execute a single statement. Errors carry the database's message.
    async fn execute(&mut self, statement: &str) -> ReconcileResult<()>;
}

/// Outcome of a successful [`apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Statements executed, in order.
    pub applied: Vec<String>,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

/// Execute `statements` in order, stopping at the first failure.
///
/// There is no enclosing transaction: statements that ran before the failure
/// stay applied and are listed in the returned [`MigrationError`].
pub async fn apply<E>(statements: &[String], executor: &mut E) -> Result<ApplyReport, MigrationError>
where
    E: StatementExecutor + ?Sized,
{
    let start = Instant::now();
    let total = statements.len();
    let mut applied = Vec::with_capacity(total);

    for (index, statement) in statements.iter().enumerate() {
        debug!(index, total, sql = %statement, "Executing statement");

        if let Err(e) = executor.execute(statement).await {
            warn!(index, total, error = %e, "Statement failed, stopping");
            return Err(MigrationError {
                index,
                total,
                statement: statement.clone(),
                applied,
                message: e.message(),
            });
        }

        applied.push(statement.clone());
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(count = total, duration_ms, "Statements applied");

    Ok(ApplyReport {
        applied,
        duration_ms,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ReconcileError;

    /// Records statements and fails on a chosen index.
    #[derive(Default)]
    pub(crate) struct RecordingExecutor {
        pub executed: Vec<String>,
        pub fail_at: Option<usize>,
    }

    #[async_trait]
    impl StatementExecutor for RecordingExecutor {
        async fn execute(&mut self, statement: &str) -> ReconcileResult<()> {
            if self.fail_at == Some(self.executed.len()) {
                return Err(ReconcileError::introspection("no such table: missing"));
            }
            self.executed.push(statement.to_string());
            Ok(())
        }
    }

    fn statements() -> Vec<String> {
        vec![
            "CREATE TABLE \"a\" (\"id\" INTEGER);".to_string(),
            "ALTER TABLE \"missing\" ADD COLUMN \"x\" TEXT;".to_string(),
            "CREATE TABLE \"c\" (\"id\" INTEGER);".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_apply_all() {
        let mut executor = RecordingExecutor::default();
        let report = apply(&statements(), &mut executor).await.unwrap();
        assert_eq!(report.applied.len(), 3);
        assert_eq!(executor.executed, statements());
    }

    #[tokio::test]
    async fn test_apply_stops_at_failure() {
        let mut executor = RecordingExecutor {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = apply(&statements(), &mut executor).await.unwrap_err();

        assert_eq!(err.index, 1);
        assert_eq!(err.total, 3);
        assert_eq!(err.statement, statements()[1]);
        assert_eq!(err.applied, vec![statements()[0].clone()]);
        assert!(err.message.contains("no such table"));
        assert_eq!(err.not_attempted(), 1);
        // Nothing after the failure ran.
        assert_eq!(executor.executed.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_empty() {
        let mut executor = RecordingExecutor::default();
        let report = apply(&[], &mut executor).await.unwrap();
        assert!(report.applied.is_empty());
    }
}
