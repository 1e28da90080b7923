//! Table, column, index and foreign-key definitions.

use std::collections::HashSet;

use crate::error::{CatalogError, CatalogResult};
use crate::types::{ColumnType, ReferentialAction};

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value as SQL expression text.
    pub default: Option<String>,
    /// Whether the database generates values for this column.
    pub auto_increment: bool,
}

impl ColumnDefinition {
    /// Create a NOT NULL column without a default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
            auto_increment: false,
        }
    }

    /// Set nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the default expression.
    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Mark the column as auto-incrementing.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Default expression in comparable form.
    pub fn normalized_default(&self) -> Option<String> {
        self.default.as_deref().map(normalize_default)
    }

    /// Structural equality used by the differ: type, nullability,
    /// auto-increment and normalized default.
    pub fn same_shape(&self, other: &ColumnDefinition) -> bool {
        self.column_type == other.column_type
            && self.nullable == other.nullable
            && self.auto_increment == other.auto_increment
            && self.normalized_default() == other.normalized_default()
    }
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    /// Create a non-unique index.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Equality ignoring the name.
    pub fn same_shape(&self, other: &IndexDefinition) -> bool {
        self.columns == other.columns && self.unique == other.unique
    }
}

/// A foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKeyDefinition {
    /// Create a foreign key with `NO ACTION` on both events.
    pub fn new<I, S, J, T>(
        name: impl Into<String>,
        columns: I,
        referenced_table: impl Into<String>,
        referenced_columns: J,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    /// Set the `ON DELETE` action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the `ON UPDATE` action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Equality ignoring the constraint name.
    ///
    /// SQLite does not report constraint names, so keys captured from it
    /// can only be matched this way.
    pub fn same_shape(&self, other: &ForeignKeyDefinition) -> bool {
        self.columns == other.columns
            && self.referenced_table == other.referenced_table
            && self.referenced_columns == other.referenced_columns
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }

    /// Whether this key points back at its own table.
    pub fn is_self_reference(&self, table: &str) -> bool {
        self.referenced_table == table
    }
}

/// A table: ordered columns, primary key, indexes and foreign keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    /// Primary-key constraint name as the database reports it. Only set on
    /// captured tables.
    pub primary_key_name: Option<String>,
    pub indexes: Vec<IndexDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

impl TableDefinition {
    /// Create an empty table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            primary_key_name: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Start a validated builder.
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(name)
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Find an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Find a foreign key by name.
    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyDefinition> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    /// Whether `column` is part of the primary key.
    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }

    /// Foreign keys that reference `table`.
    pub fn references_to<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = &'a ForeignKeyDefinition> + 'a {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.referenced_table == table)
    }

    /// Whether any foreign key references `table`.
    pub fn references(&self, table: &str) -> bool {
        self.references_to(table).next().is_some()
    }

    /// The auto-incrementing column, if any.
    pub fn auto_increment_column(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// Check the table for internal consistency.
    pub fn validate(&self) -> CatalogResult<()> {
        let table = self.name.as_str();

        if self.columns.is_empty() {
            return Err(CatalogError::EmptyTable {
                table: table.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(CatalogError::duplicate(table, "column", &column.name));
            }
        }

        let mut seen = HashSet::new();
        for name in &self.primary_key {
            if !seen.insert(name.as_str()) {
                return Err(CatalogError::duplicate(table, "primary key column", name));
            }
            let column = self
                .column(name)
                .ok_or_else(|| CatalogError::unknown_column(table, name, "primary key"))?;
            if column.nullable {
                return Err(CatalogError::NullablePrimaryKey {
                    table: table.to_string(),
                    column: name.clone(),
                });
            }
        }

        for column in self.columns.iter().filter(|c| c.auto_increment) {
            if !column.column_type.is_integer() {
                return Err(CatalogError::invalid_auto_increment(
                    table,
                    &column.name,
                    format!("type `{}` is not an integer type", column.column_type),
                ));
            }
            if self.primary_key.len() != 1 || self.primary_key[0] != column.name {
                return Err(CatalogError::invalid_auto_increment(
                    table,
                    &column.name,
                    "only the sole primary key column may auto-increment",
                ));
            }
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(CatalogError::duplicate(table, "index", &index.name));
            }
            if index.columns.is_empty() {
                return Err(CatalogError::EmptyKey {
                    table: table.to_string(),
                    kind: "index".to_string(),
                    name: index.name.clone(),
                });
            }
            for name in &index.columns {
                if !self.has_column(name) {
                    return Err(CatalogError::unknown_column(
                        table,
                        name,
                        format!("index `{}`", index.name),
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        for fk in &self.foreign_keys {
            if !seen.insert(fk.name.as_str()) {
                return Err(CatalogError::duplicate(table, "foreign key", &fk.name));
            }
            if fk.columns.is_empty() {
                return Err(CatalogError::EmptyKey {
                    table: table.to_string(),
                    kind: "foreign key".to_string(),
                    name: fk.name.clone(),
                });
            }
            if fk.columns.len() != fk.referenced_columns.len() {
                return Err(CatalogError::ForeignKeyArity {
                    table: table.to_string(),
                    name: fk.name.clone(),
                    local: fk.columns.len(),
                    referenced: fk.referenced_columns.len(),
                });
            }
            for name in &fk.columns {
                if !self.has_column(name) {
                    return Err(CatalogError::unknown_column(
                        table,
                        name,
                        format!("foreign key `{}`", fk.name),
                    ));
                }
            }
            if fk.is_self_reference(table) {
                for name in &fk.referenced_columns {
                    if !self.has_column(name) {
                        return Err(CatalogError::unknown_column(
                            table,
                            name,
                            format!("foreign key `{}` target", fk.name),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Builder for validated table definitions.
///
/// ```rust
/// use keel_schema::{ColumnDefinition, ColumnType, TableDefinition};
///
/// let posts = TableDefinition::builder("AcmeBlogPosts")
///     .column(ColumnDefinition::new("id", ColumnType::Integer).auto_increment())
///     .column(ColumnDefinition::new("title", ColumnType::String { length: Some(255) }))
///     .primary_key(["id"])
///     .build()
///     .unwrap();
/// assert_eq!(posts.columns.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct TableBuilder {
    table: TableDefinition,
}

impl TableBuilder {
    /// Start building a table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: TableDefinition::new(name),
        }
    }

    /// Append a column.
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.table.columns.push(column);
        self
    }

    /// Set the primary-key columns.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add an index.
    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.table.indexes.push(index);
        self
    }

    /// Add a foreign key.
    pub fn foreign_key(mut self, fk: ForeignKeyDefinition) -> Self {
        self.table.foreign_keys.push(fk);
        self
    }

    /// Validate and return the table.
    pub fn build(self) -> CatalogResult<TableDefinition> {
        self.table.validate()?;
        Ok(self.table)
    }
}

/// Normalize a default expression for comparison.
///
/// Strips wrapping parentheses and `::type` casts (PostgreSQL reports
/// `'draft'::character varying` for `'draft'`), unquotes numeric literals
/// that only a cast had quoted (`'-1'::integer`), and lower-cases unquoted
/// expressions so `CURRENT_TIMESTAMP` and `current_timestamp` compare equal.
pub fn normalize_default(expr: &str) -> String {
    let mut current = expr.trim();
    loop {
        let stripped = strip_wrapping_parens(current).trim();
        if stripped.len() == current.len() {
            break;
        }
        current = stripped;
    }

    let (value, had_cast) = match find_top_level_cast(current) {
        Some(pos) => (current[..pos].trim(), true),
        None => (current, false),
    };

    if is_quoted(value) {
        let inner = &value[1..value.len() - 1];
        if had_cast && inner.parse::<f64>().is_ok() {
            return inner.to_string();
        }
        return value.to_string();
    }

    value.to_ascii_lowercase()
}

fn is_quoted(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'')
}

fn strip_wrapping_parens(value: &str) -> &str {
    if !(value.starts_with('(') && value.ends_with(')')) {
        return value;
    }

    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in value.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != value.len() - 1 {
                    // `(a) + (b)`: the first paren closes early.
                    return value;
                }
            }
            _ => {}
        }
    }

    &value[1..value.len() - 1]
}

fn find_top_level_cast(value: &str) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut in_quote = false;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => depth = depth.saturating_sub(1),
            b':' if !in_quote && depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                return Some(i);
            }
            _ => {}
        }
        i += 1;
    }
    None
}
