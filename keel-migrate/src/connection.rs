//! The connection seam drivers implement.

use crate::executor::StatementExecutor;
use crate::introspect::Introspector;
use crate::sql::Dialect;

/// A live database connection able to describe itself and run DDL.
///
/// Runs borrow the connection `&mut` from start to finish; the caller owns
/// it and releases it when it is dropped.
pub trait SchemaConnection: Introspector + StatementExecutor {
    /// SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;
}
