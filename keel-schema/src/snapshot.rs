//! Immutable name-keyed collections of tables.

use indexmap::IndexMap;

use crate::error::{CatalogError, CatalogResult};
use crate::table::{ForeignKeyDefinition, TableDefinition};

/// A schema state: the tables of a database (actual) or of a catalog
/// (desired), keyed by name in insertion order.
///
/// A snapshot has no mutators; it is built once and then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    tables: IndexMap<String, TableDefinition>,
}

impl SchemaSnapshot {
    /// A snapshot with no tables.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot, rejecting duplicate table names.
    pub fn from_tables<I>(tables: I) -> CatalogResult<Self>
    where
        I: IntoIterator<Item = TableDefinition>,
    {
        let mut map = IndexMap::new();
        for table in tables {
            if map.contains_key(&table.name) {
                return Err(CatalogError::DuplicateTable { table: table.name });
            }
            map.insert(table.name.clone(), table);
        }
        Ok(Self { tables: map })
    }

    /// Look up a table.
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }

    /// Whether a table exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Tables in insertion order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    /// Table names in insertion order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the snapshot has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Foreign keys held by *other* tables that reference `table`.
    pub fn referencing<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = (&'a TableDefinition, &'a ForeignKeyDefinition)> + 'a {
        self.tables
            .values()
            .filter(move |t| t.name != table)
            .flat_map(move |t| t.references_to(table).map(move |fk| (t, fk)))
    }
}

impl<'a> IntoIterator for &'a SchemaSnapshot {
    type Item = &'a TableDefinition;
    type IntoIter = indexmap::map::Values<'a, String, TableDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.values()
    }
}
