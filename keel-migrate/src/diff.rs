//! Schema diffing: desired tables against a captured snapshot.

use keel_schema::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, SchemaSnapshot, TableDefinition,
};

/// Structural differences between the desired and the actual schema.
///
/// Produced by [`diff`] (new and changed tables only) or by
/// [`crate::reaper::drop_delta`] (dropped tables plus the changes needed to
/// detach survivors from them).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDelta {
    /// Tables to create, in catalog order.
    pub new_tables: Vec<TableDefinition>,
    /// Tables to alter, in catalog order.
    pub changed_tables: Vec<TableDiff>,
    /// Tables to drop, as captured.
    pub dropped_tables: Vec<TableDefinition>,
}

impl SchemaDelta {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.new_tables.is_empty() && self.changed_tables.is_empty() && self.dropped_tables.is_empty()
    }

    /// Get a human-readable summary of the delta.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.new_tables.is_empty() {
            parts.push(format!("Create {} tables", self.new_tables.len()));
        }
        if !self.changed_tables.is_empty() {
            parts.push(format!("Alter {} tables", self.changed_tables.len()));
        }
        if !self.dropped_tables.is_empty() {
            parts.push(format!("Drop {} tables", self.dropped_tables.len()));
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A column present on both sides whose definition changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange {
    pub before: ColumnDefinition,
    pub after: ColumnDefinition,
}

impl ColumnChange {
    /// Column name.
    pub fn name(&self) -> &str {
        &self.after.name
    }

    pub fn type_changed(&self) -> bool {
        self.before.column_type != self.after.column_type
    }

    pub fn nullability_changed(&self) -> bool {
        self.before.nullable != self.after.nullable
    }

    pub fn default_changed(&self) -> bool {
        self.before.normalized_default() != self.after.normalized_default()
    }

    pub fn auto_increment_changed(&self) -> bool {
        self.before.auto_increment != self.after.auto_increment
    }
}

/// Changes to one existing table.
///
/// Changed indexes and foreign keys appear as removed plus added. `before`
/// and `after` are the full definitions, for dialects that rebuild tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiff {
    pub table: String,
    pub added_columns: Vec<ColumnDefinition>,
    pub removed_columns: Vec<ColumnDefinition>,
    pub modified_columns: Vec<ColumnChange>,
    /// New primary key, when it changed.
    pub primary_key: Option<Vec<String>>,
    pub added_indexes: Vec<IndexDefinition>,
    pub removed_indexes: Vec<IndexDefinition>,
    pub added_foreign_keys: Vec<ForeignKeyDefinition>,
    pub removed_foreign_keys: Vec<ForeignKeyDefinition>,
    pub before: TableDefinition,
    pub after: TableDefinition,
}

impl TableDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.modified_columns.is_empty()
            && self.primary_key.is_none()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.added_foreign_keys.is_empty()
            && self.removed_foreign_keys.is_empty()
    }

    /// One-line description, e.g. `+2 columns, -1 indexes`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        let mut push = |n: usize, sign: char, label: &str| {
            if n > 0 {
                parts.push(format!("{sign}{n} {label}"));
            }
        };
        push(self.added_columns.len(), '+', "columns");
        push(self.removed_columns.len(), '-', "columns");
        push(self.modified_columns.len(), '~', "columns");
        push(self.added_indexes.len(), '+', "indexes");
        push(self.removed_indexes.len(), '-', "indexes");
        push(self.added_foreign_keys.len(), '+', "foreign keys");
        push(self.removed_foreign_keys.len(), '-', "foreign keys");
        if self.primary_key.is_some() {
            parts.push("primary key".to_string());
        }
        parts.join(", ")
    }
}

/// Compute the add/alter delta of `desired` against `actual`.
///
/// Tables present only in `actual` are left alone; removing them is the
/// reaper's job.
pub fn diff(desired: &[TableDefinition], actual: &SchemaSnapshot) -> SchemaDelta {
    let mut delta = SchemaDelta::default();

    for table in desired {
        match actual.table(&table.name) {
            None => delta.new_tables.push(table.clone()),
            Some(existing) => {
                if let Some(table_diff) = diff_table(existing, table) {
                    delta.changed_tables.push(table_diff);
                }
            }
        }
    }

    delta
}

/// Compare two definitions of the same table; `None` when they match.
pub fn diff_table(before: &TableDefinition, after: &TableDefinition) -> Option<TableDiff> {
    let mut added_columns = Vec::new();
    let mut modified_columns = Vec::new();
    for column in &after.columns {
        match before.column(&column.name) {
            None => added_columns.push(column.clone()),
            Some(old) if !old.same_shape(column) => modified_columns.push(ColumnChange {
                before: old.clone(),
                after: column.clone(),
            }),
            Some(_) => {}
        }
    }

    let removed_columns: Vec<_> = before
        .columns
        .iter()
        .filter(|c| !after.has_column(&c.name))
        .cloned()
        .collect();

    let primary_key = (before.primary_key != after.primary_key).then(|| after.primary_key.clone());

    let (added_indexes, removed_indexes) = diff_indexes(&before.indexes, &after.indexes);
    let (added_foreign_keys, removed_foreign_keys) =
        diff_foreign_keys(&before.foreign_keys, &after.foreign_keys);

    let table_diff = TableDiff {
        table: after.name.clone(),
        added_columns,
        removed_columns,
        modified_columns,
        primary_key,
        added_indexes,
        removed_indexes,
        added_foreign_keys,
        removed_foreign_keys,
        before: before.clone(),
        after: after.clone(),
    };

    (!table_diff.is_empty()).then_some(table_diff)
}

fn diff_indexes(
    before: &[IndexDefinition],
    after: &[IndexDefinition],
) -> (Vec<IndexDefinition>, Vec<IndexDefinition>) {
    let mut added = Vec::new();
    let mut removed = Vec::new();

    for old in before {
        match after.iter().find(|i| i.name == old.name) {
            Some(new) if new.same_shape(old) => {}
            _ => removed.push(old.clone()),
        }
    }
    for new in after {
        match before.iter().find(|i| i.name == new.name) {
            Some(old) if old.same_shape(new) => {}
            _ => added.push(new.clone()),
        }
    }

    (added, removed)
}

/// Match foreign keys by name first, then structurally among the leftovers.
fn diff_foreign_keys(
    before: &[ForeignKeyDefinition],
    after: &[ForeignKeyDefinition],
) -> (Vec<ForeignKeyDefinition>, Vec<ForeignKeyDefinition>) {
    let mut before_matched = vec![false; before.len()];
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut unmatched_after = Vec::new();

    for new in after {
        match before.iter().position(|fk| fk.name == new.name) {
            Some(i) => {
                before_matched[i] = true;
                if !before[i].same_shape(new) {
                    removed.push(before[i].clone());
                    added.push(new.clone());
                }
            }
            None => unmatched_after.push(new),
        }
    }

    for new in unmatched_after {
        let candidate = before
            .iter()
            .enumerate()
            .find(|(i, old)| !before_matched[*i] && old.same_shape(new));
        match candidate {
            Some((i, _)) => before_matched[i] = true,
            None => added.push(new.clone()),
        }
    }

    for (i, old) in before.iter().enumerate() {
        if !before_matched[i] {
            removed.push(old.clone());
        }
    }

    (added, removed)
}
