//! PostgreSQL connection for the Keel schema reconciler.
//!
//! [`PgConnection`] implements [`keel_migrate::SchemaConnection`] with
//! `tokio-postgres`. Introspection reads `information_schema` and
//! `pg_catalog` inside a read-only repeatable-read transaction; DDL runs one
//! statement at a time in autocommit mode.
//!
//! The configured schema is used both for introspection and as the session
//! `search_path`, so unqualified DDL lands where it was read from.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_migrate::{ReconcileConfig, Reconciler, IntrospectionConfig};
//! use keel_postgres::PgConnection;
//! use keel_schema::ManifestCatalog;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = PgConnection::connect("postgresql://app@localhost/shop?schema=tenant_a").await?;
//!     let config = ReconcileConfig::default().introspection(
//!         IntrospectionConfig::new().database_schema(conn.config().schema.clone()),
//!     );
//!
//!     let catalog = ManifestCatalog::from_file("catalog.toml")?;
//!     let report = Reconciler::with_config(catalog, config)
//!         .upgrade(&mut conn)
//!         .await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use config::{PgConfig, SslMode};
pub use connection::PgConnection;
pub use error::{PgError, PgResult};
