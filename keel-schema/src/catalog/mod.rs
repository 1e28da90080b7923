//! Entity catalogs: the desired tables of a package.

mod manifest;

pub use manifest::ManifestCatalog;

use std::collections::{BTreeSet, HashSet};

use tracing::warn;

use crate::error::{CatalogError, CatalogResult};
use crate::naming::namespace_prefix_for_handle;
use crate::table::TableDefinition;

/// Source of the desired schema.
///
/// Listing performs no I/O and returns tables in declaration order.
pub trait EntityCatalog {
    /// Table-name prefix owned by this catalog's package.
    ///
    /// An empty prefix means the package owns no namespace and nothing is
    /// ever reaped on its behalf.
    fn namespace_prefix(&self) -> &str;

    /// The validated desired tables, in declaration order.
    fn list_desired_tables(&self) -> CatalogResult<Vec<TableDefinition>>;

    /// Names of every table this catalog declares.
    fn known_table_names(&self) -> CatalogResult<BTreeSet<String>> {
        Ok(self
            .list_desired_tables()?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }
}

impl<C: EntityCatalog + ?Sized> EntityCatalog for &C {
    fn namespace_prefix(&self) -> &str {
        (**self).namespace_prefix()
    }

    fn list_desired_tables(&self) -> CatalogResult<Vec<TableDefinition>> {
        (**self).list_desired_tables()
    }
}

/// In-code catalog.
///
/// ```rust
/// use keel_schema::{Catalog, ColumnDefinition, ColumnType, EntityCatalog, TableDefinition};
///
/// let mut catalog = Catalog::for_package("acme_blog");
/// let mut posts = TableDefinition::new("AcmeBlogPosts");
/// posts.columns.push(ColumnDefinition::new("id", ColumnType::Integer));
/// catalog.register(posts);
///
/// assert_eq!(catalog.namespace_prefix(), "AcmeBlog");
/// assert_eq!(catalog.list_desired_tables().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    namespace_prefix: String,
    tables: Vec<TableDefinition>,
}

impl Catalog {
    /// Create an empty catalog owning `namespace_prefix`.
    pub fn new(namespace_prefix: impl Into<String>) -> Self {
        Self {
            namespace_prefix: namespace_prefix.into(),
            tables: Vec::new(),
        }
    }

    /// Create an empty catalog for a package handle (`acme_blog` owns
    /// `AcmeBlog*`).
    pub fn for_package(handle: &str) -> Self {
        Self::new(namespace_prefix_for_handle(handle))
    }

    /// Register a table. Validation happens when tables are listed.
    pub fn register(&mut self, table: TableDefinition) -> &mut Self {
        self.tables.push(table);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    /// Replace the namespace prefix.
    pub fn with_namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = prefix.into();
        self
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no tables are registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl EntityCatalog for Catalog {
    fn namespace_prefix(&self) -> &str {
        &self.namespace_prefix
    }

    fn list_desired_tables(&self) -> CatalogResult<Vec<TableDefinition>> {
        validate_tables(&self.tables, &self.namespace_prefix)?;
        Ok(self.tables.clone())
    }
}

/// Validate each table and reject duplicate names.
pub(crate) fn validate_tables(tables: &[TableDefinition], prefix: &str) -> CatalogResult<()> {
    let mut seen = HashSet::new();
    for table in tables {
        if !seen.insert(table.name.as_str()) {
            return Err(CatalogError::DuplicateTable {
                table: table.name.clone(),
            });
        }
        table.validate()?;

        if !prefix.is_empty() && !table.name.starts_with(prefix) {
            warn!(
                table = %table.name,
                prefix,
                "table is outside the package namespace and will never be reaped"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnDefinition;
    use crate::types::ColumnType;
    use pretty_assertions::assert_eq;

    fn table(name: &str) -> TableDefinition {
        TableDefinition::builder(name)
            .column(ColumnDefinition::new("id", ColumnType::Integer))
            .primary_key(["id"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_declaration_order() {
        let catalog = Catalog::new("Acme")
            .with_table(table("AcmeZeta"))
            .with_table(table("AcmeAlpha"));
        let names: Vec<_> = catalog
            .list_desired_tables()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["AcmeZeta", "AcmeAlpha"]);
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut catalog = Catalog::new("Acme");
        catalog.register(table("AcmeA")).register(table("AcmeA"));
        let err = catalog.list_desired_tables().unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTable { .. }));
    }

    #[test]
    fn test_malformed_table_surfaces() {
        let catalog = Catalog::new("Acme").with_table(TableDefinition::new("AcmeEmpty"));
        assert!(matches!(
            catalog.list_desired_tables(),
            Err(CatalogError::EmptyTable { .. })
        ));
    }

    #[test]
    fn test_for_package_prefix() {
        let catalog = Catalog::for_package("acme_blog");
        assert_eq!(catalog.namespace_prefix(), "AcmeBlog");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_known_table_names() {
        let catalog = Catalog::new("Acme")
            .with_table(table("AcmeB"))
            .with_table(table("AcmeA"));
        let known = catalog.known_table_names().unwrap();
        assert!(known.contains("AcmeA"));
        assert!(known.contains("AcmeB"));
        assert_eq!(known.len(), 2);
    }

    #[test]
    fn test_reference_impl_delegates() {
        fn table_count<C: EntityCatalog>(catalog: C) -> usize {
            catalog.list_desired_tables().unwrap().len()
        }

        let catalog = Catalog::new("Acme").with_table(table("AcmeA"));
        assert_eq!(table_count(&catalog), 1);
        assert_eq!(catalog.len(), 1);
    }
}
