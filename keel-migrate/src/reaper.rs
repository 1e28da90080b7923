//! Obsolete-table reaping.
//!
//! A package owns every table whose name starts with its namespace prefix.
//! Tables in that namespace that the catalog no longer declares are
//! obsolete; tables outside it are never touched.

use std::collections::BTreeSet;

use keel_schema::{SchemaSnapshot, TableDefinition};
use tracing::debug;

use crate::diff::{SchemaDelta, diff_table};

/// Names of tables in `actual` that start with `prefix` and are not `known`.
///
/// An empty prefix owns nothing and selects nothing.
pub fn find_obsolete(
    actual: &SchemaSnapshot,
    known: &BTreeSet<String>,
    prefix: &str,
) -> BTreeSet<String> {
    if prefix.is_empty() {
        return BTreeSet::new();
    }

    actual
        .table_names()
        .filter(|name| name.starts_with(prefix) && !known.contains(*name))
        .map(str::to_string)
        .collect()
}

/// Delta that drops `names` and detaches surviving tables from them.
///
/// Surviving tables that reference a dropped table lose those foreign keys
/// first. Names not present in `actual` are ignored.
pub fn drop_delta(actual: &SchemaSnapshot, names: &BTreeSet<String>) -> SchemaDelta {
    let mut delta = SchemaDelta::default();

    for table in actual.tables() {
        if names.contains(&table.name) {
            delta.dropped_tables.push(table.clone());
        } else if names.iter().any(|n| table.references(n)) {
            let detached = without_references_to(table, names);
            debug!(table = %table.name, "Detaching survivor from dropped tables");
            if let Some(table_diff) = diff_table(table, &detached) {
                delta.changed_tables.push(table_diff);
            }
        }
    }

    delta
}

/// The snapshot as it will look once `names` are dropped.
pub fn project_without(actual: &SchemaSnapshot, names: &BTreeSet<String>) -> SchemaSnapshot {
    let tables = actual
        .tables()
        .filter(|t| !names.contains(&t.name))
        .map(|t| without_references_to(t, names));

    // Names are unique in `actual`, so this cannot fail.
    SchemaSnapshot::from_tables(tables).unwrap_or_default()
}

fn without_references_to(table: &TableDefinition, names: &BTreeSet<String>) -> TableDefinition {
    let mut detached = table.clone();
    detached
        .foreign_keys
        .retain(|fk| !names.contains(&fk.referenced_table));
    detached
}
