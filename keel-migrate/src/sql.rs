//! SQL generation per dialect.

use std::fmt;
use std::str::FromStr;

use keel_schema::{
    ColumnDefinition, ColumnType, ForeignKeyDefinition, IndexDefinition, ReferentialAction,
    TableDefinition,
};

use crate::diff::{ColumnChange, TableDiff};
use crate::introspect::ColumnInfo;

/// SQL dialect of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// The statement generator for this dialect.
    pub fn generator(self) -> Box<dyn SqlGenerator> {
        match self {
            Self::Postgres => Box::new(PostgresSqlGenerator),
            Self::Sqlite => Box::new(SqliteSqlGenerator),
        }
    }

    /// Get the dialect name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}

/// Translates the table model into DDL for one dialect.
pub trait SqlGenerator: Send + Sync {
    /// Dialect this generator speaks.
    fn dialect(&self) -> Dialect;

    /// Physical type for a logical type.
    fn column_type_sql(&self, column_type: &ColumnType) -> String;

    /// Logical type for an introspected column; `None` if the metadata is
    /// unusable.
    fn column_type_from_sql(&self, column: &ColumnInfo) -> Option<ColumnType>;

    /// `table` as this dialect stores it, so that a captured copy of a
    /// created table compares equal to it.
    fn storage_shape(&self, table: &TableDefinition) -> TableDefinition {
        table.clone()
    }

    /// Whether foreign keys on a column stay valid when its type changes.
    fn type_change_keeps_references(&self) -> bool {
        false
    }

    /// CREATE TABLE plus its indexes.
    fn create_table(&self, table: &TableDefinition) -> Vec<String>;

    /// Statements that turn `diff.before` into `diff.after`.
    fn alter_table(&self, diff: &TableDiff) -> Vec<String>;

    /// Generate DROP TABLE statement.
    fn drop_table(&self, name: &str) -> String {
        format!("DROP TABLE {};", quote_ident(name))
    }

    /// Drop a table that is still referenced by tables dropped in the same
    /// run (a reference cycle).
    fn drop_table_in_cycle(&self, name: &str) -> Vec<String> {
        vec![self.drop_table(name)]
    }

    /// `ALTER TABLE .. ADD CONSTRAINT`, or `None` if the dialect cannot add
    /// constraints to existing tables.
    fn add_foreign_key(&self, table: &str, fk: &ForeignKeyDefinition) -> Option<String>;

    /// `ALTER TABLE .. DROP CONSTRAINT`, or `None` if the dialect cannot drop
    /// constraints from existing tables.
    fn drop_foreign_key(&self, table: &str, fk: &ForeignKeyDefinition) -> Option<String>;

    /// Generate CREATE INDEX statement.
    fn create_index(&self, table: &str, index: &IndexDefinition) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}INDEX {} ON {}({});",
            unique,
            quote_ident(&index.name),
            quote_ident(table),
            column_list(&index.columns)
        )
    }

    /// Generate DROP INDEX statement.
    fn drop_index(&self, index: &IndexDefinition) -> String {
        format!("DROP INDEX {};", quote_ident(&index.name))
    }
}

/// Quote an identifier with double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn foreign_key_clause(fk: &ForeignKeyDefinition) -> String {
    let mut clause = format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(&fk.name),
        column_list(&fk.columns),
        quote_ident(&fk.referenced_table),
        column_list(&fk.referenced_columns)
    );
    if fk.on_delete != ReferentialAction::NoAction {
        clause.push_str(&format!(" ON DELETE {}", fk.on_delete.as_sql()));
    }
    if fk.on_update != ReferentialAction::NoAction {
        clause.push_str(&format!(" ON UPDATE {}", fk.on_update.as_sql()));
    }
    clause
}

fn create_table_statement(table: &TableDefinition, entries: Vec<String>) -> String {
    format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_ident(&table.name),
        entries.join(",\n    ")
    )
}

/// Split `NAME(a, b)` into `("NAME", [a, b])`.
fn split_type_args(declared: &str) -> (String, Vec<u32>) {
    match declared.split_once('(') {
        Some((base, rest)) => {
            let args = rest
                .trim_end_matches(')')
                .split(',')
                .filter_map(|a| a.trim().parse().ok())
                .collect();
            (base.trim().to_ascii_uppercase(), args)
        }
        None => (declared.trim().to_ascii_uppercase(), Vec::new()),
    }
}

/// SQL generator for PostgreSQL.
pub struct PostgresSqlGenerator;

impl PostgresSqlGenerator {
    /// Generate column definition.
    fn column_definition(&self, column: &ColumnDefinition) -> String {
        let mut parts = vec![quote_ident(&column.name), self.column_type_sql(&column.column_type)];

        if column.auto_increment {
            parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string());
        }

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = column.default.as_ref().filter(|_| !column.auto_increment) {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }

    /// Generate ALTER COLUMN statements.
    fn alter_column(&self, table: &str, change: &ColumnChange) -> Vec<String> {
        let mut stmts = Vec::new();
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            quote_ident(table),
            quote_ident(change.name())
        );

        if change.auto_increment_changed() && change.before.auto_increment {
            stmts.push(format!("{prefix} DROP IDENTITY IF EXISTS;"));
        }

        if change.type_changed() {
            let new_type = self.column_type_sql(&change.after.column_type);
            stmts.push(format!(
                "{prefix} TYPE {new_type} USING {}::{new_type};",
                quote_ident(change.name())
            ));
        }

        if change.nullability_changed() {
            if change.after.nullable {
                stmts.push(format!("{prefix} DROP NOT NULL;"));
            } else {
                stmts.push(format!("{prefix} SET NOT NULL;"));
            }
        }

        if change.default_changed() {
            match &change.after.default {
                Some(default) if !change.after.auto_increment => {
                    stmts.push(format!("{prefix} SET DEFAULT {default};"));
                }
                _ => stmts.push(format!("{prefix} DROP DEFAULT;")),
            }
        }

        if change.auto_increment_changed() && change.after.auto_increment {
            stmts.push(format!("{prefix} ADD GENERATED BY DEFAULT AS IDENTITY;"));
        }

        stmts
    }

    /// The captured constraint name, else the server's default one.
    fn primary_key_name(table: &TableDefinition) -> String {
        table
            .primary_key_name
            .clone()
            .unwrap_or_else(|| default_primary_key_name(&table.name))
    }
}

/// `<table>_pkey`, with the table part cut so the whole name fits in
/// PostgreSQL's 63-byte identifier limit.
fn default_primary_key_name(table: &str) -> String {
    const SUFFIX: &str = "_pkey";
    let mut end = table.len().min(POSTGRES_MAX_IDENTIFIER - SUFFIX.len());
    while !table.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{SUFFIX}", &table[..end])
}

const POSTGRES_MAX_IDENTIFIER: usize = 63;

impl SqlGenerator for PostgresSqlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn column_type_sql(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({precision}, {scale})"),
            ColumnType::String { length: Some(n) } => format!("VARCHAR({n})"),
            ColumnType::String { length: None } => "VARCHAR".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Custom(raw) => raw.clone(),
        }
    }

    fn column_type_from_sql(&self, column: &ColumnInfo) -> Option<ColumnType> {
        let ty = match column.udt_name.as_str() {
            "" => return None,
            "int2" => ColumnType::SmallInt,
            "int4" => ColumnType::Integer,
            "int8" => ColumnType::BigInt,
            "bool" => ColumnType::Boolean,
            "float4" => ColumnType::Float,
            "float8" => ColumnType::Double,
            "numeric" => match (column.numeric_precision, column.numeric_scale) {
                (Some(precision), scale) => ColumnType::Decimal {
                    precision: u8::try_from(precision).ok()?,
                    scale: u8::try_from(scale.unwrap_or(0)).ok()?,
                },
                (None, _) => ColumnType::Custom("numeric".to_string()),
            },
            "varchar" => ColumnType::String {
                length: column
                    .character_maximum_length
                    .and_then(|n| u32::try_from(n).ok()),
            },
            "text" => ColumnType::Text,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "timestamp" => ColumnType::DateTime,
            "bytea" => ColumnType::Binary,
            "jsonb" => ColumnType::Json,
            "uuid" => ColumnType::Uuid,
            other => ColumnType::Custom(other.to_string()),
        };
        Some(ty)
    }

    /// Generate CREATE TABLE statement.
    fn create_table(&self, table: &TableDefinition) -> Vec<String> {
        let mut entries: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        if !table.primary_key.is_empty() {
            entries.push(format!("PRIMARY KEY ({})", column_list(&table.primary_key)));
        }

        for fk in &table.foreign_keys {
            entries.push(foreign_key_clause(fk));
        }

        let mut stmts = vec![create_table_statement(table, entries)];
        for index in &table.indexes {
            stmts.push(self.create_index(&table.name, index));
        }
        stmts
    }

    /// Generate ALTER TABLE statements.
    ///
    /// Constraints and indexes that go away are dropped first, then columns
    /// are added, altered and dropped, then new keys and indexes are created.
    fn alter_table(&self, diff: &TableDiff) -> Vec<String> {
        let table = quote_ident(&diff.table);
        let mut stmts = Vec::new();

        for fk in &diff.removed_foreign_keys {
            stmts.extend(self.drop_foreign_key(&diff.table, fk));
        }

        for index in &diff.removed_indexes {
            stmts.push(self.drop_index(index));
        }

        if diff.primary_key.is_some() && !diff.before.primary_key.is_empty() {
            stmts.push(format!(
                "ALTER TABLE {table} DROP CONSTRAINT {};",
                quote_ident(&Self::primary_key_name(&diff.before))
            ));
        }

        for column in &diff.added_columns {
            stmts.push(format!(
                "ALTER TABLE {table} ADD COLUMN {};",
                self.column_definition(column)
            ));
        }

        for change in &diff.modified_columns {
            stmts.extend(self.alter_column(&diff.table, change));
        }

        for column in &diff.removed_columns {
            stmts.push(format!(
                "ALTER TABLE {table} DROP COLUMN {};",
                quote_ident(&column.name)
            ));
        }

        if let Some(primary_key) = diff.primary_key.as_ref().filter(|pk| !pk.is_empty()) {
            stmts.push(format!(
                "ALTER TABLE {table} ADD PRIMARY KEY ({});",
                column_list(primary_key)
            ));
        }

        for index in &diff.added_indexes {
            stmts.push(self.create_index(&diff.table, index));
        }

        for fk in &diff.added_foreign_keys {
            stmts.extend(self.add_foreign_key(&diff.table, fk));
        }

        stmts
    }

    fn add_foreign_key(&self, table: &str, fk: &ForeignKeyDefinition) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ADD {};",
            quote_ident(table),
            foreign_key_clause(fk)
        ))
    }

    fn drop_foreign_key(&self, table: &str, fk: &ForeignKeyDefinition) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            quote_ident(table),
            quote_ident(&fk.name)
        ))
    }
}

/// SQL generator for SQLite.
///
/// SQLite cannot alter constraints or column definitions in place; anything
/// beyond adding or dropping plain columns and indexes rebuilds the table.
pub struct SqliteSqlGenerator;

/// Scratch-table prefix used while SQLite rebuilds a table. Never
/// introspected.
pub(crate) const SQLITE_REBUILD_PREFIX: &str = "__keel_new_";

impl SqliteSqlGenerator {
    /// Generate column definition for SQLite.
    fn column_definition(&self, column: &ColumnDefinition) -> String {
        if column.auto_increment {
            // AUTOINCREMENT is only accepted on an INTEGER PRIMARY KEY.
            return format!(
                "{} INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT",
                quote_ident(&column.name)
            );
        }

        let mut parts = vec![quote_ident(&column.name), self.column_type_sql(&column.column_type)];

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }

    /// Whether `ALTER TABLE .. ADD COLUMN` can add this column.
    fn can_add_in_place(column: &ColumnDefinition) -> bool {
        if column.auto_increment {
            return false;
        }
        match column.normalized_default() {
            // Non-constant defaults are rejected by ADD COLUMN.
            Some(default) => !default.starts_with("current_") && !default.contains('('),
            None => column.nullable,
        }
    }

    /// Whether `ALTER TABLE .. DROP COLUMN` can drop this column.
    fn can_drop_in_place(diff: &TableDiff, column: &ColumnDefinition) -> bool {
        !diff.before.is_primary_key_column(&column.name)
            && !diff
                .before
                .foreign_keys
                .iter()
                .any(|fk| fk.columns.contains(&column.name))
            && !diff
                .before
                .indexes
                .iter()
                .filter(|i| !diff.removed_indexes.contains(i))
                .any(|i| i.columns.contains(&column.name))
    }

    fn needs_rebuild(diff: &TableDiff) -> bool {
        !diff.modified_columns.is_empty()
            || diff.primary_key.is_some()
            || !diff.added_foreign_keys.is_empty()
            || !diff.removed_foreign_keys.is_empty()
            || !diff.added_columns.iter().all(Self::can_add_in_place)
            || !diff
                .removed_columns
                .iter()
                .all(|c| Self::can_drop_in_place(diff, c))
    }

    /// Create-copy-swap: build the new shape under a scratch name, copy the
    /// surviving columns into it, then replace the old table.
    ///
    /// The old table is only dropped once the copy succeeded, so a failure
    /// at any earlier statement leaves the original rows in place.
    fn rebuild_table(&self, diff: &TableDiff) -> Vec<String> {
        let scratch_name = format!("{SQLITE_REBUILD_PREFIX}{}", diff.table);
        let table = quote_ident(&diff.table);
        let scratch = quote_ident(&scratch_name);
        let common: Vec<String> = diff
            .after
            .columns
            .iter()
            .filter(|c| diff.before.has_column(&c.name))
            .map(|c| c.name.clone())
            .collect();

        let mut target = diff.after.clone();
        target.name = scratch_name.clone();
        let mut create = self.create_table(&target);
        create.truncate(1);

        let mut stmts = vec![
            "PRAGMA foreign_keys = OFF;".to_string(),
            format!("DROP TABLE IF EXISTS {scratch};"),
        ];
        stmts.extend(create);
        if !common.is_empty() {
            let columns = column_list(&common);
            stmts.push(format!(
                "INSERT INTO {scratch} ({columns}) SELECT {columns} FROM {table};"
            ));
        }
        stmts.push(self.drop_table(&diff.table));
        stmts.push(format!("ALTER TABLE {scratch} RENAME TO {table};"));
        for index in &diff.after.indexes {
            stmts.push(self.create_index(&diff.table, index));
        }
        stmts.push("PRAGMA foreign_keys = ON;".to_string());
        stmts
    }
}

impl SqlGenerator for SqliteSqlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn column_type_sql(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({precision}, {scale})"),
            ColumnType::String { length: Some(n) } => format!("VARCHAR({n})"),
            ColumnType::String { length: None } => "VARCHAR".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Custom(raw) => raw.clone(),
        }
    }

    /// Auto-increment keys are always stored as `INTEGER PRIMARY KEY`.
    fn storage_shape(&self, table: &TableDefinition) -> TableDefinition {
        let mut stored = table.clone();
        for column in stored.columns.iter_mut().filter(|c| c.auto_increment) {
            column.column_type = ColumnType::Integer;
        }
        stored
    }

    /// Rebuilds run with enforcement off and SQLite compares keys by affinity.
    fn type_change_keeps_references(&self) -> bool {
        true
    }

    /// SQLite keeps the declared type text; parse it back.
    fn column_type_from_sql(&self, column: &ColumnInfo) -> Option<ColumnType> {
        let declared = column.udt_name.trim();
        let (base, args) = split_type_args(declared);
        let ty = match base.as_str() {
            "SMALLINT" => ColumnType::SmallInt,
            "INTEGER" | "INT" => ColumnType::Integer,
            "BIGINT" => ColumnType::BigInt,
            "BOOLEAN" => ColumnType::Boolean,
            "REAL" | "FLOAT" => ColumnType::Float,
            "DOUBLE" | "DOUBLE PRECISION" => ColumnType::Double,
            "NUMERIC" | "DECIMAL" if !args.is_empty() => ColumnType::Decimal {
                precision: u8::try_from(args[0]).ok()?,
                scale: u8::try_from(args.get(1).copied().unwrap_or(0)).ok()?,
            },
            "VARCHAR" => ColumnType::String {
                length: args.first().copied(),
            },
            "TEXT" => ColumnType::Text,
            "DATE" => ColumnType::Date,
            "TIME" => ColumnType::Time,
            "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
            "BLOB" => ColumnType::Binary,
            "JSON" => ColumnType::Json,
            "UUID" => ColumnType::Uuid,
            _ => ColumnType::Custom(declared.to_string()),
        };
        Some(ty)
    }

    /// Generate CREATE TABLE statement.
    fn create_table(&self, table: &TableDefinition) -> Vec<String> {
        let mut entries: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        // The auto-increment column carries the key inline.
        if !table.primary_key.is_empty() && table.auto_increment_column().is_none() {
            entries.push(format!("PRIMARY KEY ({})", column_list(&table.primary_key)));
        }

        for fk in &table.foreign_keys {
            entries.push(foreign_key_clause(fk));
        }

        let mut stmts = vec![create_table_statement(table, entries)];
        for index in &table.indexes {
            stmts.push(self.create_index(&table.name, index));
        }
        stmts
    }

    fn alter_table(&self, diff: &TableDiff) -> Vec<String> {
        if Self::needs_rebuild(diff) {
            return self.rebuild_table(diff);
        }

        let table = quote_ident(&diff.table);
        let mut stmts = Vec::new();

        for index in &diff.removed_indexes {
            stmts.push(self.drop_index(index));
        }

        for column in &diff.added_columns {
            stmts.push(format!(
                "ALTER TABLE {table} ADD COLUMN {};",
                self.column_definition(column)
            ));
        }

        for column in &diff.removed_columns {
            stmts.push(format!(
                "ALTER TABLE {table} DROP COLUMN {};",
                quote_ident(&column.name)
            ));
        }

        for index in &diff.added_indexes {
            stmts.push(self.create_index(&diff.table, index));
        }

        stmts
    }

    fn drop_table_in_cycle(&self, name: &str) -> Vec<String> {
        vec![
            "PRAGMA foreign_keys = OFF;".to_string(),
            self.drop_table(name),
            "PRAGMA foreign_keys = ON;".to_string(),
        ]
    }

    fn add_foreign_key(&self, _table: &str, _fk: &ForeignKeyDefinition) -> Option<String> {
        None
    }

    fn drop_foreign_key(&self, _table: &str, _fk: &ForeignKeyDefinition) -> Option<String> {
        None
    }
}
