//! # Keel
//!
//! Declarative schema reconciliation for packages that own a set of tables
//! in a shared database.
//!
//! A package declares the tables it wants in an entity catalog. Keel reads
//! the live schema, diffs the two, orders the resulting DDL so that foreign
//! keys never point at missing tables, and executes it one statement at a
//! time. Tables carrying the package's namespace prefix that the catalog no
//! longer declares are dropped first.
//!
//! Keel provides:
//! - A table model with a builder and a TOML manifest format
//! - Live introspection for PostgreSQL and SQLite
//! - A structural differ and a dependency-ordered planner
//! - An obsolete-table reaper scoped to the namespace prefix
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Catalog::for_package("acme_blog").with_table(
//!         TableDefinition::builder("AcmeBlogPosts")
//!             .column(ColumnDefinition::new("id", ColumnType::Integer).auto_increment())
//!             .column(ColumnDefinition::new("title", ColumnType::String { length: Some(255) }))
//!             .primary_key(["id"])
//!             .build()?,
//!     );
//!
//!     let mut conn = keel::sqlite::SqliteConnection::connect("sqlite://./blog.db").await?;
//!     let report = Reconciler::new(catalog).install(&mut conn).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Table model, entity catalogs and configuration.
pub mod schema {
    pub use keel_schema::*;
}

/// Introspection, diffing, planning and execution.
pub mod migrate {
    pub use keel_migrate::*;
}

/// SQLite connection.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use keel_sqlite::*;
}

/// PostgreSQL connection.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use keel_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        ReconcileConfig, ReconcileError, ReconcileReport, Reconciler, SchemaConnection,
    };
    pub use crate::schema::{
        Catalog, ColumnDefinition, ColumnType, EntityCatalog, ForeignKeyDefinition,
        IndexDefinition, ManifestCatalog, ReferentialAction, TableDefinition,
    };
}

// Re-export key types at the crate root
pub use migrate::{ReconcileError, Reconciler};
pub use schema::{CatalogError, EntityCatalog};
