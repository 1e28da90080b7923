//! TOML catalog manifests.
//!
//! ```toml
//! package = "acme_blog"
//!
//! [[table]]
//! name = "AcmeBlogPosts"
//! primary_key = ["id"]
//!
//! [[table.column]]
//! name = "id"
//! type = "integer"
//! auto_increment = true
//!
//! [[table.column]]
//! name = "title"
//! type = "string"
//! length = 255
//!
//! [[table.index]]
//! name = "idx_posts_title"
//! columns = ["title"]
//!
//! [[table.foreign_key]]
//! name = "fk_posts_author"
//! columns = ["author_id"]
//! references = { table = "AcmeBlogAuthors", columns = ["id"] }
//! on_delete = "cascade"
//! ```

use std::path::Path;

use serde::Deserialize;

use super::{Catalog, EntityCatalog};
use crate::error::{CatalogError, CatalogResult};
use crate::naming::namespace_prefix_for_handle;
use crate::table::{ColumnDefinition, ForeignKeyDefinition, IndexDefinition, TableDefinition};
use crate::types::{ColumnType, ReferentialAction};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    /// Package handle; derives the namespace prefix.
    package: Option<String>,
    /// Explicit namespace prefix; wins over `package`.
    namespace_prefix: Option<String>,
    #[serde(default, rename = "table")]
    tables: Vec<TableSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableSpec {
    name: String,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default, rename = "column")]
    columns: Vec<ColumnSpec>,
    #[serde(default, rename = "index")]
    indexes: Vec<IndexSpec>,
    #[serde(default, rename = "foreign_key")]
    foreign_keys: Vec<ForeignKeySpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ColumnSpec {
    name: String,
    #[serde(rename = "type")]
    column_type: Option<String>,
    length: Option<u32>,
    precision: Option<u8>,
    scale: Option<u8>,
    #[serde(default)]
    nullable: bool,
    default: Option<String>,
    #[serde(default)]
    auto_increment: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexSpec {
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    unique: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForeignKeySpec {
    name: String,
    columns: Vec<String>,
    references: ReferenceSpec,
    on_delete: Option<String>,
    on_update: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReferenceSpec {
    table: String,
    columns: Vec<String>,
}

/// A catalog read from a TOML manifest.
///
/// The file is read and converted once at load time; structural validation
/// runs when tables are listed, exactly as for [`Catalog`].
#[derive(Debug, Clone)]
pub struct ManifestCatalog {
    inner: Catalog,
}

impl ManifestCatalog {
    /// Load a manifest from a file.
    pub fn from_file(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::from_str(&content)
    }

    /// Parse a manifest from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> CatalogResult<Self> {
        let manifest: Manifest = toml::from_str(content).map_err(|e| CatalogError::Manifest {
            message: e.to_string(),
        })?;

        let prefix = match (&manifest.namespace_prefix, &manifest.package) {
            (Some(prefix), _) => prefix.clone(),
            (None, Some(handle)) => namespace_prefix_for_handle(handle),
            (None, None) => String::new(),
        };

        let mut inner = Catalog::new(prefix);
        for spec in manifest.tables {
            inner.register(convert_table(spec)?);
        }

        Ok(Self { inner })
    }

    /// Override the namespace prefix declared by the manifest.
    pub fn with_namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inner = self.inner.with_namespace_prefix(prefix);
        self
    }

    /// The underlying in-code catalog.
    pub fn into_catalog(self) -> Catalog {
        self.inner
    }
}

impl EntityCatalog for ManifestCatalog {
    fn namespace_prefix(&self) -> &str {
        self.inner.namespace_prefix()
    }

    fn list_desired_tables(&self) -> CatalogResult<Vec<TableDefinition>> {
        self.inner.list_desired_tables()
    }
}

fn convert_table(spec: TableSpec) -> CatalogResult<TableDefinition> {
    let mut table = TableDefinition::new(spec.name);
    table.primary_key = spec.primary_key;

    for column in spec.columns {
        let type_name = column
            .column_type
            .ok_or_else(|| CatalogError::MissingColumnType {
                table: table.name.clone(),
                column: column.name.clone(),
            })?;
        let column_type =
            ColumnType::from_name(&type_name, column.length, column.precision, column.scale)
                .ok_or_else(|| CatalogError::UnknownColumnType {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    type_name: type_name.clone(),
                })?;

        table.columns.push(ColumnDefinition {
            name: column.name,
            column_type,
            nullable: column.nullable,
            default: column.default,
            auto_increment: column.auto_increment,
        });
    }

    for index in spec.indexes {
        let mut def = IndexDefinition::new(index.name, index.columns);
        def.unique = index.unique;
        table.indexes.push(def);
    }

    for fk in spec.foreign_keys {
        let on_delete = parse_action(&fk.name, fk.on_delete.as_deref())?;
        let on_update = parse_action(&fk.name, fk.on_update.as_deref())?;
        table.foreign_keys.push(
            ForeignKeyDefinition::new(fk.name, fk.columns, fk.references.table, fk.references.columns)
                .on_delete(on_delete)
                .on_update(on_update),
        );
    }

    Ok(table)
}

fn parse_action(name: &str, action: Option<&str>) -> CatalogResult<ReferentialAction> {
    match action {
        None => Ok(ReferentialAction::NoAction),
        Some(raw) => raw
            .parse()
            .map_err(|_| CatalogError::UnknownReferentialAction {
                name: name.to_string(),
                action: raw.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const BLOG: &str = r#"
        package = "acme_blog"

        [[table]]
        name = "AcmeBlogAuthors"
        primary_key = ["id"]

        [[table.column]]
        name = "id"
        type = "integer"
        auto_increment = true

        [[table.column]]
        name = "name"
        type = "string"
        length = 100

        [[table]]
        name = "AcmeBlogPosts"
        primary_key = ["id"]

        [[table.column]]
        name = "id"
        type = "integer"
        auto_increment = true

        [[table.column]]
        name = "author_id"
        type = "integer"

        [[table.column]]
        name = "status"
        type = "string"
        length = 20
        default = "'draft'"

        [[table.column]]
        name = "price"
        type = "decimal"
        precision = 8
        scale = 2
        nullable = true

        [[table.index]]
        name = "idx_posts_author"
        columns = ["author_id"]

        [[table.foreign_key]]
        name = "fk_posts_author"
        columns = ["author_id"]
        references = { table = "AcmeBlogAuthors", columns = ["id"] }
        on_delete = "cascade"
    "#;

    #[test]
    fn test_parse_blog_manifest() {
        let catalog = ManifestCatalog::from_str(BLOG).unwrap();
        assert_eq!(catalog.namespace_prefix(), "AcmeBlog");

        let tables = catalog.list_desired_tables().unwrap();
        assert_eq!(tables.len(), 2);

        let posts = &tables[1];
        assert_eq!(posts.name, "AcmeBlogPosts");
        assert_eq!(
            posts.column("price").map(|c| &c.column_type),
            Some(&ColumnType::Decimal {
                precision: 8,
                scale: 2
            })
        );
        assert_eq!(
            posts.column("status").and_then(|c| c.default.as_deref()),
            Some("'draft'")
        );
        assert_eq!(posts.foreign_keys[0].on_delete, ReferentialAction::Cascade);
        assert_eq!(posts.foreign_keys[0].on_update, ReferentialAction::NoAction);
    }

    #[test]
    fn test_explicit_prefix_wins() {
        let catalog =
            ManifestCatalog::from_str("package = \"acme_blog\"\nnamespace_prefix = \"Blog_\"")
                .unwrap();
        assert_eq!(catalog.namespace_prefix(), "Blog_");

        let catalog = catalog.with_namespace_prefix("Other");
        assert_eq!(catalog.namespace_prefix(), "Other");
    }

    #[test]
    fn test_no_package_means_empty_prefix() {
        let catalog = ManifestCatalog::from_str("").unwrap();
        assert_eq!(catalog.namespace_prefix(), "");
        assert!(catalog.list_desired_tables().unwrap().is_empty());
    }

    #[test]
    fn test_missing_type() {
        let err = ManifestCatalog::from_str(
            r#"
            [[table]]
            name = "T"
            [[table.column]]
            name = "a"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            CatalogError::MissingColumnType {
                table: "T".to_string(),
                column: "a".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type() {
        let err = ManifestCatalog::from_str(
            r#"
            [[table]]
            name = "T"
            [[table.column]]
            name = "a"
            type = "money"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownColumnType { .. }));
    }

    #[test]
    fn test_unknown_action() {
        let err = ManifestCatalog::from_str(
            r#"
            [[table]]
            name = "T"
            [[table.column]]
            name = "a"
            type = "integer"
            [[table.foreign_key]]
            name = "fk"
            columns = ["a"]
            references = { table = "U", columns = ["id"] }
            on_delete = "explode"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownReferentialAction { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ManifestCatalog::from_str(
            r#"
            [[table]]
            name = "T"
            colour = "blue"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Manifest { .. }));
    }

    #[test]
    fn test_structural_errors_surface_on_listing() {
        let catalog = ManifestCatalog::from_str(
            r#"
            [[table]]
            name = "T"
            primary_key = ["missing"]
            [[table.column]]
            name = "a"
            type = "integer"
            "#,
        )
        .unwrap();
        assert!(matches!(
            catalog.list_desired_tables(),
            Err(CatalogError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BLOG.as_bytes()).unwrap();

        let catalog = ManifestCatalog::from_file(file.path()).unwrap();
        assert_eq!(catalog.into_catalog().len(), 2);
    }

    #[test]
    fn test_from_missing_file() {
        let err = ManifestCatalog::from_file("/nonexistent/catalog.toml").unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
