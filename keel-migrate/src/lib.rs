//! # keel-migrate
//!
//! Reconciliation engine for Keel.
//!
//! This crate provides functionality for:
//! - Capturing the live schema of a database into a [`SchemaSnapshot`]
//! - Diffing a catalog's desired tables against that snapshot
//! - Ordering the resulting DDL by foreign-key dependencies
//! - Executing it statement by statement
//! - Reaping obsolete tables in a package's namespace
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │   Catalog    │────▶│ Schema Differ  │────▶│  Planner    │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                              ▲                     │
//!                              │                     ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │  Introspector  │     │  Executor   │
//!                      └────────────────┘     └─────────────┘
//!                              ▲
//!                      ┌────────────────┐
//!                      │     Reaper     │ (separate pass, runs first)
//!                      └────────────────┘
//! ```
//!
//! Drivers implement [`SchemaConnection`]; `keel-sqlite` and `keel-postgres`
//! provide the stock ones.
//!
//! ## Example
//!
//! ```rust,ignore
//! use keel_migrate::{ReconcileConfig, Reconciler};
//! use keel_schema::ManifestCatalog;
//!
//! async fn install(conn: &mut impl keel_migrate::SchemaConnection) -> keel_migrate::ReconcileResult<()> {
//!     let catalog = ManifestCatalog::from_file("catalog.toml")?;
//!     let reconciler = Reconciler::with_config(catalog, ReconcileConfig::new());
//!
//!     let report = reconciler.install(conn).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod introspect;
pub mod plan;
pub mod reaper;
pub mod sql;

pub use connection::SchemaConnection;
pub use diff::{ColumnChange, SchemaDelta, TableDiff, diff, diff_table};
pub use engine::{ReconcileConfig, ReconcileReport, Reconciler};
pub use error::{MigrationError, PlanError, ReconcileError, ReconcileResult};
pub use executor::{ApplyReport, StatementExecutor, apply};
pub use introspect::{
    ColumnInfo, ConstraintInfo, IndexInfo, IntrospectionConfig, Introspector, SnapshotBuilder,
    TableInfo, capture_snapshot,
};
pub use plan::{MigrationPlan, MigrationPlanner, PlannedStep};
pub use reaper::{drop_delta, find_obsolete, project_without};
pub use sql::{Dialect, PostgresSqlGenerator, SqlGenerator, SqliteSqlGenerator, quote_ident};

pub use keel_schema::SchemaSnapshot;
