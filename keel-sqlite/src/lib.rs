//! SQLite connection for the Keel schema reconciler.
//!
//! This crate implements [`keel_migrate::SchemaConnection`] on top of
//! `tokio-rusqlite`: schema introspection through `sqlite_master` and the
//! `pragma_*` table-valued functions, and statement execution.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_migrate::Reconciler;
//! use keel_schema::ManifestCatalog;
//! use keel_sqlite::SqliteConnection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = SqliteConnection::connect("sqlite://./app.db").await?;
//!     let catalog = ManifestCatalog::from_file("catalog.toml")?;
//!
//!     let report = Reconciler::new(catalog).install(&mut conn).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};
