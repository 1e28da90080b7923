//! Live schema introspection.
//!
//! Drivers implement [`Introspector`] and only fetch raw metadata rows;
//! [`SnapshotBuilder`] turns those rows into a [`SchemaSnapshot`], and
//! [`capture_snapshot`] drives the whole read inside a consistent window.

use std::collections::HashMap;

use keel_schema::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction, SchemaSnapshot,
    TableDefinition,
};
use tracing::{debug, info, instrument, warn};

use crate::connection::SchemaConnection;
use crate::error::{ReconcileError, ReconcileResult};
use crate::sql::{SQLITE_REBUILD_PREFIX, SqlGenerator};

/// Configuration for introspection.
#[derive(Debug, Clone)]
pub struct IntrospectionConfig {
    /// Schema to introspect (default: "public"). Ignored by SQLite.
    pub database_schema: String,
    /// Tables to include (empty = all).
    pub include_tables: Vec<String>,
    /// Tables to exclude.
    pub exclude_tables: Vec<String>,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            database_schema: "public".to_string(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

impl IntrospectionConfig {
    /// Create a new introspection config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database schema to introspect.
    pub fn database_schema(mut self, schema: impl Into<String>) -> Self {
        self.database_schema = schema.into();
        self
    }

    /// Include only these tables.
    pub fn include_tables(mut self, tables: Vec<String>) -> Self {
        self.include_tables = tables;
        self
    }

    /// Exclude these tables.
    pub fn exclude_tables(mut self, tables: Vec<String>) -> Self {
        self.exclude_tables = tables;
        self
    }

    /// Check if a table should be included.
    pub fn should_include_table(&self, name: &str) -> bool {
        if name == "sqlite_sequence"
            || name.starts_with(SQLITE_REBUILD_PREFIX)
            || self.exclude_tables.iter().any(|t| t == name)
        {
            return false;
        }
        if self.include_tables.is_empty() {
            return true;
        }
        self.include_tables.iter().any(|t| t == name)
    }
}

/// Raw table information from the database.
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Table schema (e.g., "public", "main").
    pub schema: String,
    /// Table type ("BASE TABLE" or "VIEW").
    pub table_type: String,
}

impl TableInfo {
    /// Create a base-table row.
    pub fn base_table(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            table_type: "BASE TABLE".to_string(),
        }
    }

    fn is_base_table(&self) -> bool {
        self.table_type == "BASE TABLE"
    }
}

/// Raw column information from the database.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Data type as reported (e.g. "character varying", or SQLite's
    /// declared type "VARCHAR(255)").
    pub data_type: String,
    /// Short type name (e.g. "int4", "varchar"). SQLite repeats the
    /// declared type here.
    pub udt_name: String,
    /// Character maximum length (for varchar, etc.).
    pub character_maximum_length: Option<i32>,
    /// Numeric precision.
    pub numeric_precision: Option<i32>,
    /// Numeric scale.
    pub numeric_scale: Option<i32>,
    /// Whether the column is nullable.
    pub is_nullable: bool,
    /// Default value expression.
    pub column_default: Option<String>,
    /// Ordinal position.
    pub ordinal_position: i32,
    /// Whether the database generates the value (identity, serial,
    /// AUTOINCREMENT).
    pub is_identity: bool,
}

/// Raw constraint information from the database.
#[derive(Debug, Clone)]
pub struct ConstraintInfo {
    /// Constraint name; `None` where the engine does not keep one (SQLite).
    pub name: Option<String>,
    /// Constraint type (PRIMARY KEY or FOREIGN KEY).
    pub constraint_type: String,
    /// Table name.
    pub table_name: String,
    /// Columns in the constraint.
    pub columns: Vec<String>,
    /// Referenced table (for foreign keys).
    pub referenced_table: Option<String>,
    /// Referenced columns (for foreign keys). Empty means "the referenced
    /// table's primary key".
    pub referenced_columns: Vec<String>,
    /// On delete action (for foreign keys).
    pub on_delete: Option<String>,
    /// On update action (for foreign keys).
    pub on_update: Option<String>,
}

impl ConstraintInfo {
    /// Create a primary-key constraint row.
    pub fn primary_key(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: None,
            constraint_type: PRIMARY_KEY.to_string(),
            table_name: table.into(),
            columns,
            referenced_table: None,
            referenced_columns: Vec::new(),
            on_delete: None,
            on_update: None,
        }
    }
}

const PRIMARY_KEY: &str = "PRIMARY KEY";
const FOREIGN_KEY: &str = "FOREIGN KEY";

/// Raw index information from the database.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Table name.
    pub table_name: String,
    /// Columns in the index.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub is_unique: bool,
    /// Whether this is a primary key index.
    pub is_primary: bool,
}

/// Trait for database introspection.
///
/// Methods take `&mut self`: a connection serves one run at a time.
#[async_trait::async_trait]
pub trait Introspector: Send {
    /// Open a read-consistent window for the following queries.
    async fn begin_read(&mut self) -> ReconcileResult<()> {
        Ok(())
    }

    /// Close the window opened by [`begin_read`](Self::begin_read).
    async fn end_read(&mut self) -> ReconcileResult<()> {
        Ok(())
    }

    /// Get all tables in the database.
    async fn get_tables(&mut self, config: &IntrospectionConfig) -> ReconcileResult<Vec<TableInfo>>;

    /// Get columns for a table.
    async fn get_columns(&mut self, table: &str, schema: &str) -> ReconcileResult<Vec<ColumnInfo>>;

    /// Get primary-key and foreign-key constraints for a table.
    async fn get_constraints(
        &mut self,
        table: &str,
        schema: &str,
    ) -> ReconcileResult<Vec<ConstraintInfo>>;

    /// Get secondary indexes for a table.
    async fn get_indexes(&mut self, table: &str, schema: &str) -> ReconcileResult<Vec<IndexInfo>>;
}

/// Build a [`SchemaSnapshot`] from introspection data.
pub struct SnapshotBuilder {
    config: IntrospectionConfig,
    tables: Vec<TableInfo>,
    columns: HashMap<String, Vec<ColumnInfo>>,
    constraints: HashMap<String, Vec<ConstraintInfo>>,
    indexes: HashMap<String, Vec<IndexInfo>>,
}

impl SnapshotBuilder {
    /// Create a new snapshot builder.
    pub fn new(config: IntrospectionConfig) -> Self {
        Self {
            config,
            tables: Vec::new(),
            columns: HashMap::new(),
            constraints: HashMap::new(),
            indexes: HashMap::new(),
        }
    }

    /// Add table information.
    pub fn with_tables(mut self, tables: Vec<TableInfo>) -> Self {
        self.tables = tables;
        self
    }

    /// Add column information for a table.
    pub fn with_columns(mut self, table: &str, columns: Vec<ColumnInfo>) -> Self {
        self.columns.insert(table.to_string(), columns);
        self
    }

    /// Add constraint information for a table.
    pub fn with_constraints(mut self, table: &str, constraints: Vec<ConstraintInfo>) -> Self {
        self.constraints.insert(table.to_string(), constraints);
        self
    }

    /// Add index information for a table.
    pub fn with_indexes(mut self, table: &str, indexes: Vec<IndexInfo>) -> Self {
        self.indexes.insert(table.to_string(), indexes);
        self
    }

    /// Assemble the snapshot, mapping physical types through `generator`.
    pub fn build(mut self, generator: &dyn SqlGenerator) -> ReconcileResult<SchemaSnapshot> {
        let table_infos = std::mem::take(&mut self.tables);
        let mut tables = Vec::with_capacity(table_infos.len());

        for info in table_infos {
            if !info.is_base_table() || !self.config.should_include_table(&info.name) {
                debug!(table = %info.name, "skipping table");
                continue;
            }
            tables.push(self.build_table(&info.name, generator)?);
        }

        resolve_implicit_references(&mut tables)?;

        SchemaSnapshot::from_tables(tables)
            .map_err(|e| ReconcileError::introspection(e.to_string()))
    }

    fn build_table(
        &mut self,
        name: &str,
        generator: &dyn SqlGenerator,
    ) -> ReconcileResult<TableDefinition> {
        let mut table = TableDefinition::new(name);

        let mut columns = self.columns.remove(name).unwrap_or_default();
        columns.sort_by_key(|c| c.ordinal_position);
        for col in columns {
            let column_type = generator.column_type_from_sql(&col).ok_or_else(|| {
                ReconcileError::introspection(format!(
                    "unsupported type '{}' for column '{}.{}'",
                    col.udt_name, name, col.name
                ))
            })?;
            table.columns.push(ColumnDefinition {
                name: col.name,
                column_type,
                nullable: col.is_nullable,
                default: if col.is_identity { None } else { col.column_default },
                auto_increment: col.is_identity,
            });
        }

        for constraint in self.constraints.remove(name).unwrap_or_default() {
            for column in &constraint.columns {
                if !table.has_column(column) {
                    return Err(ReconcileError::introspection(format!(
                        "{} of '{}' names unknown column '{}'",
                        constraint.constraint_type.to_lowercase(),
                        name,
                        column
                    )));
                }
            }

            match constraint.constraint_type.as_str() {
                PRIMARY_KEY => {
                    if !table.primary_key.is_empty() {
                        return Err(ReconcileError::introspection(format!(
                            "table '{name}' reports more than one primary key"
                        )));
                    }
                    table.primary_key_name = constraint.name;
                    table.primary_key = constraint.columns;
                }
                FOREIGN_KEY => table.foreign_keys.push(foreign_key(name, constraint)?),
                other => {
                    debug!(table = name, constraint_type = other, "ignoring constraint");
                }
            }
        }

        for index in self.indexes.remove(name).unwrap_or_default() {
            if index.is_primary {
                continue;
            }
            if let Some(missing) = index.columns.iter().find(|c| !table.has_column(c)) {
                return Err(ReconcileError::introspection(format!(
                    "index '{}' of '{}' names unknown column '{}'",
                    index.name, name, missing
                )));
            }
            table.indexes.push(IndexDefinition {
                name: index.name,
                columns: index.columns,
                unique: index.is_unique,
            });
        }

        if let Some(column) = table.columns.iter().find(|c| c.auto_increment) {
            if !table.is_primary_key_column(&column.name) {
                warn!(table = name, column = %column.name, "generated column outside the primary key");
            }
        }

        Ok(table)
    }
}

fn foreign_key(table: &str, constraint: ConstraintInfo) -> ReconcileResult<ForeignKeyDefinition> {
    let referenced_table = constraint.referenced_table.ok_or_else(|| {
        ReconcileError::introspection(format!("foreign key on '{table}' has no referenced table"))
    })?;

    let name = constraint
        .name
        .unwrap_or_else(|| format!("{}_{}_fkey", table, constraint.columns.join("_")));

    if !constraint.referenced_columns.is_empty()
        && constraint.referenced_columns.len() != constraint.columns.len()
    {
        return Err(ReconcileError::introspection(format!(
            "foreign key '{name}' on '{table}' maps {} column(s) onto {}",
            constraint.columns.len(),
            constraint.referenced_columns.len()
        )));
    }

    let on_delete = parse_action(&name, constraint.on_delete.as_deref())?;
    let on_update = parse_action(&name, constraint.on_update.as_deref())?;

    Ok(ForeignKeyDefinition {
        name,
        columns: constraint.columns,
        referenced_table,
        referenced_columns: constraint.referenced_columns,
        on_delete,
        on_update,
    })
}

fn parse_action(name: &str, action: Option<&str>) -> ReconcileResult<ReferentialAction> {
    action.unwrap_or_default().parse().map_err(|raw| {
        ReconcileError::introspection(format!(
            "foreign key '{name}' has unknown referential action '{raw}'"
        ))
    })
}

/// Fill in foreign keys that reference the target's primary key implicitly
/// (SQLite reports no target columns for `REFERENCES t`).
fn resolve_implicit_references(tables: &mut [TableDefinition]) -> ReconcileResult<()> {
    let primary_keys: HashMap<String, Vec<String>> = tables
        .iter()
        .map(|t| (t.name.clone(), t.primary_key.clone()))
        .collect();

    for table in tables.iter_mut() {
        for fk in table.foreign_keys.iter_mut() {
            if !fk.referenced_columns.is_empty() {
                continue;
            }
            match primary_keys.get(&fk.referenced_table) {
                Some(pk) if pk.len() == fk.columns.len() => fk.referenced_columns = pk.clone(),
                _ => {
                    return Err(ReconcileError::introspection(format!(
                        "foreign key '{}' on '{}' has no resolvable target columns",
                        fk.name, table.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Capture the live schema.
///
/// All queries run between `begin_read` and `end_read`; `end_read` runs on
/// every exit path.
#[instrument(skip_all, fields(schema = %config.database_schema))]
pub async fn capture_snapshot<C>(
    conn: &mut C,
    config: &IntrospectionConfig,
) -> ReconcileResult<SchemaSnapshot>
where
    C: SchemaConnection + ?Sized,
{
    let generator = conn.dialect().generator();

    conn.begin_read().await?;
    let gathered = gather(conn, config).await;
    let ended = conn.end_read().await;

    let builder = match (gathered, ended) {
        (Ok(builder), Ok(())) => builder,
        (Ok(_), Err(e)) => return Err(e),
        (Err(e), Ok(())) => return Err(e),
        (Err(e), Err(end_err)) => {
            warn!(error = %end_err, "failed to close read window after introspection error");
            return Err(e);
        }
    };

    let snapshot = builder.build(generator.as_ref())?;
    info!(tables = snapshot.len(), "captured schema snapshot");
    Ok(snapshot)
}

async fn gather<C>(conn: &mut C, config: &IntrospectionConfig) -> ReconcileResult<SnapshotBuilder>
where
    C: SchemaConnection + ?Sized,
{
    let schema = config.database_schema.as_str();
    let tables = conn.get_tables(config).await?;
    let mut builder = SnapshotBuilder::new(config.clone());

    for table in &tables {
        if !table.is_base_table() || !config.should_include_table(&table.name) {
            continue;
        }
        let columns = conn.get_columns(&table.name, schema).await?;
        let constraints = conn.get_constraints(&table.name, schema).await?;
        let indexes = conn.get_indexes(&table.name, schema).await?;
        builder = builder
            .with_columns(&table.name, columns)
            .with_constraints(&table.name, constraints)
            .with_indexes(&table.name, indexes);
    }

    Ok(builder.with_tables(tables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::PostgresSqlGenerator;
    use keel_schema::ColumnType;
    use pretty_assertions::assert_eq;

    fn col(name: &str, udt: &str, position: i32) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: udt.to_string(),
            udt_name: udt.to_string(),
            ordinal_position: position,
            ..Default::default()
        }
    }

    fn fk(table: &str, columns: &[&str], target: &str, target_columns: &[&str]) -> ConstraintInfo {
        ConstraintInfo {
            name: Some(format!("fk_{table}_{target}")),
            constraint_type: FOREIGN_KEY.to_string(),
            table_name: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: Some(target.to_string()),
            referenced_columns: target_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: Some("CASCADE".to_string()),
            on_update: Some("NO ACTION".to_string()),
        }
    }

    #[test]
    fn test_config_include_exclude() {
        let config = IntrospectionConfig::new()
            .include_tables(vec!["A".to_string(), "B".to_string()])
            .exclude_tables(vec!["B".to_string()]);
        assert!(config.should_include_table("A"));
        assert!(!config.should_include_table("B"));
        assert!(!config.should_include_table("C"));
        assert!(!IntrospectionConfig::default().should_include_table("sqlite_sequence"));
        // Left behind by an interrupted SQLite rebuild.
        assert!(!IntrospectionConfig::default().should_include_table("__keel_new_AcmeA"));
    }

    #[test]
    fn test_build_orders_columns_and_maps_types() {
        let mut id = col("id", "int4", 1);
        id.is_identity = true;
        id.column_default = Some("nextval('a_id_seq'::regclass)".to_string());
        let mut name = col("name", "varchar", 2);
        name.character_maximum_length = Some(100);
        name.is_nullable = true;

        let mut primary_key = ConstraintInfo::primary_key("A", vec!["id".into()]);
        primary_key.name = Some("a_primary".to_string());

        let snapshot = SnapshotBuilder::new(IntrospectionConfig::default())
            .with_tables(vec![TableInfo::base_table("A", "public")])
            .with_columns("A", vec![name, id])
            .with_constraints("A", vec![primary_key])
            .build(&PostgresSqlGenerator)
            .unwrap();

        let a = snapshot.table("A").unwrap();
        assert_eq!(a.columns[0].name, "id");
        assert!(a.columns[0].auto_increment);
        assert_eq!(a.columns[0].default, None);
        assert_eq!(a.columns[1].column_type, ColumnType::String { length: Some(100) });
        assert!(a.columns[1].nullable);
        assert_eq!(a.primary_key, vec!["id"]);
        assert_eq!(a.primary_key_name.as_deref(), Some("a_primary"));
    }

    #[test]
    fn test_views_and_excluded_tables_skipped() {
        let view = TableInfo {
            name: "V".to_string(),
            schema: "public".to_string(),
            table_type: "VIEW".to_string(),
        };
        let snapshot = SnapshotBuilder::new(IntrospectionConfig::new().exclude_tables(vec!["B".into()]))
            .with_tables(vec![view, TableInfo::base_table("B", "public")])
            .build(&PostgresSqlGenerator)
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_foreign_keys_and_indexes() {
        let snapshot = SnapshotBuilder::new(IntrospectionConfig::default())
            .with_tables(vec![
                TableInfo::base_table("Parent", "public"),
                TableInfo::base_table("Child", "public"),
            ])
            .with_columns("Parent", vec![col("id", "int4", 1)])
            .with_constraints("Parent", vec![ConstraintInfo::primary_key("Parent", vec!["id".into()])])
            .with_columns("Child", vec![col("id", "int4", 1), col("parent_id", "int4", 2)])
            .with_constraints("Child", vec![fk("Child", &["parent_id"], "Parent", &["id"])])
            .with_indexes(
                "Child",
                vec![
                    IndexInfo {
                        name: "Child_pkey".to_string(),
                        table_name: "Child".to_string(),
                        columns: vec!["id".to_string()],
                        is_unique: true,
                        is_primary: true,
                    },
                    IndexInfo {
                        name: "idx_child_parent".to_string(),
                        table_name: "Child".to_string(),
                        columns: vec!["parent_id".to_string()],
                        is_unique: false,
                        is_primary: false,
                    },
                ],
            )
            .build(&PostgresSqlGenerator)
            .unwrap();

        let child = snapshot.table("Child").unwrap();
        assert_eq!(child.indexes.len(), 1);
        assert_eq!(child.indexes[0].name, "idx_child_parent");
        assert_eq!(child.foreign_keys[0].referenced_table, "Parent");
        assert_eq!(child.foreign_keys[0].on_delete, ReferentialAction::Cascade);
    }

    #[test]
    fn test_unnamed_foreign_key_gets_name_and_implicit_target() {
        let mut constraint = fk("Child", &["parent_id"], "Parent", &[]);
        constraint.name = None;

        let snapshot = SnapshotBuilder::new(IntrospectionConfig::default())
            .with_tables(vec![
                TableInfo::base_table("Parent", "main"),
                TableInfo::base_table("Child", "main"),
            ])
            .with_columns("Parent", vec![col("id", "int4", 1)])
            .with_constraints("Parent", vec![ConstraintInfo::primary_key("Parent", vec!["id".into()])])
            .with_columns("Child", vec![col("parent_id", "int4", 1)])
            .with_constraints("Child", vec![constraint])
            .build(&PostgresSqlGenerator)
            .unwrap();

        let fk = &snapshot.table("Child").unwrap().foreign_keys[0];
        assert_eq!(fk.name, "Child_parent_id_fkey");
        assert_eq!(fk.referenced_columns, vec!["id"]);
    }

    #[test]
    fn test_index_on_unknown_column_is_error() {
        let result = SnapshotBuilder::new(IntrospectionConfig::default())
            .with_tables(vec![TableInfo::base_table("A", "public")])
            .with_columns("A", vec![col("id", "int4", 1)])
            .with_indexes(
                "A",
                vec![IndexInfo {
                    name: "idx".to_string(),
                    table_name: "A".to_string(),
                    columns: vec!["ghost".to_string()],
                    is_unique: false,
                    is_primary: false,
                }],
            )
            .build(&PostgresSqlGenerator);
        assert!(matches!(result, Err(ReconcileError::Introspection(_))));
    }

    #[test]
    fn test_foreign_key_arity_mismatch_is_error() {
        let result = SnapshotBuilder::new(IntrospectionConfig::default())
            .with_tables(vec![TableInfo::base_table("A", "public")])
            .with_columns("A", vec![col("x", "int4", 1)])
            .with_constraints("A", vec![fk("A", &["x"], "B", &["id", "other"])])
            .build(&PostgresSqlGenerator);
        assert!(matches!(result, Err(ReconcileError::Introspection(_))));
    }

    #[test]
    fn test_duplicate_table_is_error() {
        let result = SnapshotBuilder::new(IntrospectionConfig::default())
            .with_tables(vec![
                TableInfo::base_table("A", "public"),
                TableInfo::base_table("A", "public"),
            ])
            .build(&PostgresSqlGenerator);
        assert!(matches!(result, Err(ReconcileError::Introspection(_))));
    }

    #[test]
    fn test_unsupported_type_is_error() {
        let result = SnapshotBuilder::new(IntrospectionConfig::default())
            .with_tables(vec![TableInfo::base_table("A", "public")])
            .with_columns("A", vec![col("x", "", 1)])
            .build(&PostgresSqlGenerator);
        assert!(matches!(result, Err(ReconcileError::Introspection(_))));
    }
}
