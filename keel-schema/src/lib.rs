//! # keel-schema
//!
//! Table model and entity catalogs for the Keel schema reconciler.
//!
//! This crate provides:
//! - Table, column, index and foreign-key definitions
//! - Immutable [`SchemaSnapshot`]s keyed by table name
//! - Entity catalogs: in-code registration and TOML manifests
//! - Configuration parser for `keel.toml` files
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_schema::{EntityCatalog, KeelConfig, ManifestCatalog};
//!
//! let config = KeelConfig::from_file("keel.toml")?;
//! let catalog = ManifestCatalog::from_file("catalog.toml")?;
//! for table in catalog.list_desired_tables()? {
//!     println!("{}", table.name);
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod naming;
pub mod snapshot;
pub mod table;
pub mod types;

pub use catalog::{Catalog, EntityCatalog, ManifestCatalog};
pub use config::KeelConfig;
pub use error::{CatalogError, CatalogResult, ConfigError, ConfigResult};
pub use snapshot::SchemaSnapshot;
pub use table::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, TableBuilder, TableDefinition,
    normalize_default,
};
pub use types::{ColumnType, ReferentialAction};
