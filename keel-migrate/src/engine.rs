//! The reconciliation engine.

use std::collections::BTreeSet;
use std::time::Instant;

use keel_schema::{EntityCatalog, SchemaSnapshot, TableDefinition};
use tracing::{info, instrument};

use crate::connection::SchemaConnection;
use crate::diff::{SchemaDelta, diff};
use crate::error::{ReconcileError, ReconcileResult};
use crate::executor::apply;
use crate::introspect::{IntrospectionConfig, capture_snapshot};
use crate::plan::{MigrationPlan, MigrationPlanner};
use crate::reaper::{drop_delta, find_obsolete, project_without};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// What to introspect.
    pub introspection: IntrospectionConfig,
    /// Whether to drop obsolete tables before reconciling.
    pub drop_obsolete: bool,
    /// Plan without executing.
    pub dry_run: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            introspection: IntrospectionConfig::default(),
            drop_obsolete: true,
            dry_run: false,
        }
    }
}

impl ReconcileConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the introspection configuration.
    pub fn introspection(mut self, config: IntrospectionConfig) -> Self {
        self.introspection = config;
        self
    }

    /// Enable or disable the obsolete-table pass.
    pub fn drop_obsolete(mut self, drop: bool) -> Self {
        self.drop_obsolete = drop;
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Result of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tables dropped (or that would be, in a dry run).
    pub dropped_tables: Vec<String>,
    /// Tables created.
    pub created_tables: Vec<String>,
    /// Tables altered, including survivors detached from dropped tables.
    pub altered_tables: Vec<String>,
    /// Statements executed (or planned, in a dry run), in order.
    pub statements: Vec<String>,
    /// Whether nothing was executed.
    pub dry_run: bool,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl ReconcileReport {
    /// Check if the run changed (or would change) anything.
    pub fn has_changes(&self) -> bool {
        !self.statements.is_empty()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.created_tables.is_empty() {
            parts.push(format!("{} created", self.created_tables.len()));
        }
        if !self.altered_tables.is_empty() {
            parts.push(format!("{} altered", self.altered_tables.len()));
        }
        if !self.dropped_tables.is_empty() {
            parts.push(format!("{} dropped", self.dropped_tables.len()));
        }

        if parts.is_empty() {
            "Schema is up to date".to_string()
        } else if self.dry_run {
            format!("Would run {} statements: {}", self.statements.len(), parts.join(", "))
        } else {
            format!(
                "{} statements in {}ms: {}",
                self.statements.len(),
                self.duration_ms,
                parts.join(", ")
            )
        }
    }

    fn record(&mut self, delta: &SchemaDelta, plan: &MigrationPlan) {
        self.created_tables
            .extend(delta.new_tables.iter().map(|t| t.name.clone()));
        for table_diff in &delta.changed_tables {
            if !self.altered_tables.contains(&table_diff.table) {
                self.altered_tables.push(table_diff.table.clone());
            }
        }
        self.dropped_tables
            .extend(delta.dropped_tables.iter().map(|t| t.name.clone()));
        self.statements.extend(plan.statements());
    }
}

/// Brings a database in line with a catalog.
///
/// Holds no connection; every run borrows one for its whole duration.
pub struct Reconciler<C: EntityCatalog> {
    catalog: C,
    config: ReconcileConfig,
}

impl<C: EntityCatalog> Reconciler<C> {
    /// Create a reconciler with the default configuration.
    pub fn new(catalog: C) -> Self {
        Self::with_config(catalog, ReconcileConfig::default())
    }

    /// Create a reconciler with an explicit configuration.
    pub fn with_config(catalog: C, config: ReconcileConfig) -> Self {
        Self { catalog, config }
    }

    /// Get the catalog.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Install the package schema. Same as [`reconcile`](Self::reconcile).
    pub async fn install<X>(&self, conn: &mut X) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        self.reconcile(conn).await
    }

    /// Upgrade the package schema. Same as [`reconcile`](Self::reconcile).
    pub async fn upgrade<X>(&self, conn: &mut X) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        self.reconcile(conn).await
    }

    /// Compute what [`reconcile`](Self::reconcile) would run, without running it.
    pub async fn plan<X>(&self, conn: &mut X) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        self.run(conn, true).await
    }

    /// Drop obsolete tables, then create and alter tables to match the catalog.
    ///
    /// Honors [`ReconcileConfig::dry_run`].
    pub async fn reconcile<X>(&self, conn: &mut X) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        self.run(conn, self.config.dry_run).await
    }

    #[instrument(skip_all, fields(prefix = %self.catalog.namespace_prefix(), dry_run = dry_run))]
    async fn run<X>(&self, conn: &mut X, dry_run: bool) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        let start = Instant::now();
        // Catalog errors surface before the database is touched.
        let desired = self.catalog.list_desired_tables()?;
        let known: BTreeSet<String> = desired.iter().map(|t| t.name.clone()).collect();

        let generator = conn.dialect().generator();
        let desired: Vec<TableDefinition> =
            desired.iter().map(|t| generator.storage_shape(t)).collect();
        let mut report = ReconcileReport {
            dry_run,
            ..Default::default()
        };

        let mut actual = capture_snapshot(conn, &self.config.introspection).await?;
        let mut reaped: Vec<String> = Vec::new();

        if self.config.drop_obsolete {
            let obsolete = find_obsolete(&actual, &known, self.catalog.namespace_prefix());
            if !obsolete.is_empty() {
                info!(count = obsolete.len(), "Dropping obsolete tables");
                let delta = drop_delta(&actual, &obsolete);
                let plan = MigrationPlanner::new(generator.as_ref(), &actual).plan(&delta)?;
                if dry_run {
                    actual = project_without(&actual, &obsolete);
                } else {
                    apply(&plan.statements(), conn).await?;
                    reaped = plan.statements();
                }
                report.record(&delta, &plan);
            }
        }

        // Failures from here on happen after the reap pass ran.
        let main_pass = async {
            if !reaped.is_empty() {
                actual = capture_snapshot(conn, &self.config.introspection).await?;
            }
            let delta = diff(&desired, &actual);
            info!(delta = %delta.summary(), "Computed schema delta");
            let plan = MigrationPlanner::new(generator.as_ref(), &actual).plan(&delta)?;
            if !dry_run && !plan.is_empty() {
                apply(&plan.statements(), conn).await?;
            }
            report.record(&delta, &plan);
            Ok::<(), ReconcileError>(())
        };
        main_pass.await.map_err(|err| err.after_applied(&reaped))?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(summary = %report.summary(), "Reconcile finished");
        Ok(report)
    }

    /// Only drop obsolete tables. Ignores [`ReconcileConfig::drop_obsolete`].
    #[instrument(skip_all, fields(prefix = %self.catalog.namespace_prefix()))]
    pub async fn reap<X>(&self, conn: &mut X) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        let known = self.catalog.known_table_names()?;
        let actual = capture_snapshot(conn, &self.config.introspection).await?;
        let obsolete = find_obsolete(&actual, &known, self.catalog.namespace_prefix());
        self.drop_tables(conn, &actual, &obsolete).await
    }

    /// Drop every catalog table present in the database.
    #[instrument(skip_all, fields(prefix = %self.catalog.namespace_prefix()))]
    pub async fn uninstall<X>(&self, conn: &mut X) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        let known = self.catalog.known_table_names()?;
        let actual = capture_snapshot(conn, &self.config.introspection).await?;
        let present: BTreeSet<String> = known
            .into_iter()
            .filter(|name| actual.contains(name))
            .collect();
        self.drop_tables(conn, &actual, &present).await
    }

    async fn drop_tables<X>(
        &self,
        conn: &mut X,
        actual: &SchemaSnapshot,
        names: &BTreeSet<String>,
    ) -> ReconcileResult<ReconcileReport>
    where
        X: SchemaConnection + ?Sized,
    {
        let start = Instant::now();
        let dry_run = self.config.dry_run;
        let mut report = ReconcileReport {
            dry_run,
            ..Default::default()
        };

        let delta = drop_delta(actual, names);
        let generator = conn.dialect().generator();
        let plan = MigrationPlanner::new(generator.as_ref(), actual).plan(&delta)?;
        if !dry_run && !plan.is_empty() {
            apply(&plan.statements(), conn).await?;
        }
        report.record(&delta, &plan);

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(summary = %report.summary(), "Drop finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StatementExecutor;
    use crate::introspect::{ColumnInfo, ConstraintInfo, IndexInfo, Introspector, TableInfo};
    use crate::sql::Dialect;
    use async_trait::async_trait;
    use keel_schema::{Catalog, ColumnDefinition, ColumnType, TableDefinition};
    use pretty_assertions::assert_eq;

    /// Serves a fixed snapshot and records statements.
    struct FakeConnection {
        tables: Vec<TableDefinition>,
        executed: Vec<String>,
        reads: usize,
        fail_read: Option<usize>,
        fail_statement: Option<&'static str>,
    }

    impl FakeConnection {
        fn new(tables: Vec<TableDefinition>) -> Self {
            Self {
                tables,
                executed: Vec::new(),
                reads: 0,
                fail_read: None,
                fail_statement: None,
            }
        }

        fn table(&self, name: &str) -> ReconcileResult<&TableDefinition> {
            self.tables
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| ReconcileError::introspection(format!("no table {name}")))
        }
    }

    #[async_trait]
    impl Introspector for FakeConnection {
        async fn get_tables(&mut self, _config: &IntrospectionConfig) -> ReconcileResult<Vec<TableInfo>> {
            self.reads += 1;
            if self.fail_read == Some(self.reads) {
                return Err(ReconcileError::connection("connection reset"));
            }
            Ok(self
                .tables
                .iter()
                .map(|t| TableInfo::base_table(&t.name, "public"))
                .collect())
        }

        async fn get_columns(&mut self, table: &str, _schema: &str) -> ReconcileResult<Vec<ColumnInfo>> {
            let generator = Dialect::Postgres.generator();
            Ok(self
                .table(table)?
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| ColumnInfo {
                    name: c.name.clone(),
                    data_type: generator.column_type_sql(&c.column_type),
                    udt_name: match c.column_type {
                        ColumnType::Integer => "int4".to_string(),
                        _ => "text".to_string(),
                    },
                    is_nullable: c.nullable,
                    column_default: c.default.clone(),
                    ordinal_position: i as i32 + 1,
                    ..Default::default()
                })
                .collect())
        }

        async fn get_constraints(&mut self, table: &str, _schema: &str) -> ReconcileResult<Vec<ConstraintInfo>> {
            let t = self.table(table)?;
            Ok(vec![ConstraintInfo::primary_key(&t.name, t.primary_key.clone())])
        }

        async fn get_indexes(&mut self, _table: &str, _schema: &str) -> ReconcileResult<Vec<IndexInfo>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl StatementExecutor for FakeConnection {
        async fn execute(&mut self, statement: &str) -> ReconcileResult<()> {
            if self.fail_statement.is_some_and(|prefix| statement.starts_with(prefix)) {
                return Err(ReconcileError::connection("statement rejected"));
            }
            self.executed.push(statement.to_string());
            Ok(())
        }
    }

    impl SchemaConnection for FakeConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }
    }

    fn table(name: &str, columns: &[&str]) -> TableDefinition {
        let mut builder = TableDefinition::builder(name)
            .column(ColumnDefinition::new("id", ColumnType::Integer))
            .primary_key(["id"]);
        for c in columns {
            builder = builder.column(ColumnDefinition::new(*c, ColumnType::Text).nullable(true));
        }
        builder.build().unwrap()
    }

    fn catalog() -> Catalog {
        Catalog::new("Acme").with_table(table("AcmeA", &["name"]))
    }

    #[tokio::test]
    async fn test_reconcile_creates_and_reaps() {
        let mut conn = FakeConnection::new(vec![table("AcmeOld", &[]), table("Users", &[])]);
        let reconciler = Reconciler::new(catalog());

        let report = reconciler.reconcile(&mut conn).await.unwrap();
        assert_eq!(report.dropped_tables, vec!["AcmeOld"]);
        assert_eq!(report.created_tables, vec!["AcmeA"]);
        assert_eq!(conn.executed[0], "DROP TABLE \"AcmeOld\";");
        assert!(conn.executed[1].starts_with("CREATE TABLE \"AcmeA\""));
        // Re-captured after the reap pass.
        assert_eq!(conn.reads, 2);
    }

    #[tokio::test]
    async fn test_main_pass_failure_reports_reaped_statements() {
        let mut conn = FakeConnection::new(vec![table("AcmeOld", &[])]);
        conn.fail_statement = Some("CREATE TABLE \"AcmeA\"");

        let err = Reconciler::new(catalog()).reconcile(&mut conn).await.unwrap_err();
        let ReconcileError::Migration(failure) = &err else {
            panic!("expected a statement failure, got {err:?}");
        };
        assert_eq!(failure.applied, vec!["DROP TABLE \"AcmeOld\";"]);
        assert_eq!(failure.index, 1);
        assert_eq!(failure.total, 2);
        assert!(failure.statement.starts_with("CREATE TABLE \"AcmeA\""));
    }

    #[tokio::test]
    async fn test_capture_failure_after_reap_reports_reaped_statements() {
        let mut conn = FakeConnection::new(vec![table("AcmeOld", &[])]);
        conn.fail_read = Some(2);

        let err = Reconciler::new(catalog()).reconcile(&mut conn).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Interrupted { .. }));
        assert_eq!(err.applied(), ["DROP TABLE \"AcmeOld\";".to_string()]);
        assert!(err.is_transient());
        assert_eq!(conn.executed, vec!["DROP TABLE \"AcmeOld\";"]);
    }

    #[tokio::test]
    async fn test_reconcile_alters() {
        let mut conn = FakeConnection::new(vec![table("AcmeA", &[])]);
        let reconciler = Reconciler::new(catalog());

        let report = reconciler.reconcile(&mut conn).await.unwrap();
        assert_eq!(report.altered_tables, vec!["AcmeA"]);
        assert_eq!(
            conn.executed,
            vec!["ALTER TABLE \"AcmeA\" ADD COLUMN \"name\" TEXT;"]
        );
    }

    #[tokio::test]
    async fn test_reconcile_up_to_date() {
        let mut conn = FakeConnection::new(vec![table("AcmeA", &["name"])]);
        let report = Reconciler::new(catalog()).reconcile(&mut conn).await.unwrap();
        assert!(!report.has_changes());
        assert!(conn.executed.is_empty());
        assert_eq!(report.summary(), "Schema is up to date");
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let mut conn = FakeConnection::new(vec![table("AcmeOld", &[])]);
        let report = Reconciler::new(catalog()).plan(&mut conn).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.dropped_tables, vec!["AcmeOld"]);
        assert_eq!(report.created_tables, vec!["AcmeA"]);
        assert_eq!(report.statements.len(), 2);
        assert!(conn.executed.is_empty());
        assert_eq!(conn.reads, 1);
    }

    #[tokio::test]
    async fn test_drop_obsolete_disabled() {
        let mut conn = FakeConnection::new(vec![table("AcmeOld", &[])]);
        let config = ReconcileConfig::new().drop_obsolete(false);
        let report = Reconciler::with_config(catalog(), config)
            .reconcile(&mut conn)
            .await
            .unwrap();
        assert!(report.dropped_tables.is_empty());
        assert_eq!(report.created_tables, vec!["AcmeA"]);
    }

    #[tokio::test]
    async fn test_catalog_error_before_io() {
        let mut conn = FakeConnection::new(Vec::new());
        let broken = Catalog::new("Acme").with_table(TableDefinition::new("AcmeEmpty"));

        let err = Reconciler::new(broken).reconcile(&mut conn).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Catalog(_)));
        assert_eq!(conn.reads, 0);
    }

    #[tokio::test]
    async fn test_uninstall_drops_catalog_tables_only() {
        let mut conn = FakeConnection::new(vec![table("AcmeA", &["name"]), table("Users", &[])]);
        let report = Reconciler::new(catalog()).uninstall(&mut conn).await.unwrap();
        assert_eq!(report.dropped_tables, vec!["AcmeA"]);
        assert_eq!(conn.executed, vec!["DROP TABLE \"AcmeA\";"]);
    }

    #[tokio::test]
    async fn test_reap_only() {
        let mut conn = FakeConnection::new(vec![table("AcmeOld", &[]), table("AcmeA", &[])]);
        let report = Reconciler::new(catalog()).reap(&mut conn).await.unwrap();
        assert_eq!(report.dropped_tables, vec!["AcmeOld"]);
        assert!(report.created_tables.is_empty());
        assert!(report.altered_tables.is_empty());
    }
}
