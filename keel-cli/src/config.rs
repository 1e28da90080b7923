//! Configuration loading and database connection setup.

use std::path::{Path, PathBuf};

use keel_migrate::{IntrospectionConfig, ReconcileConfig, SchemaConnection};
use keel_schema::config::DatabaseProvider;
use keel_schema::{EntityCatalog, KeelConfig, ManifestCatalog};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "keel.toml";

/// Everything a command needs: the parsed config and the resolved database.
#[derive(Debug, Clone)]
pub struct Context {
    /// Parsed `keel.toml` (defaults when the file is absent).
    pub config: KeelConfig,
    /// Directory relative paths in the config resolve against.
    pub config_dir: PathBuf,
    /// Database URL.
    pub url: String,
    /// Database provider.
    pub provider: DatabaseProvider,
}

impl Context {
    /// Load `config_path` and resolve the database URL and provider.
    ///
    /// A missing config file is not an error; a URL must then come from the
    /// command line.
    pub fn load(config_path: &Path, url: Option<String>) -> CliResult<Self> {
        let config = if config_path.exists() {
            KeelConfig::from_file(config_path)?
        } else {
            debug!(path = %config_path.display(), "no config file, using defaults");
            KeelConfig::default()
        };

        let config_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_config(config, config_dir, url)
    }

    /// Resolve the database from an already parsed config.
    pub fn from_config(
        config: KeelConfig,
        config_dir: PathBuf,
        url: Option<String>,
    ) -> CliResult<Self> {
        let url = url
            .or_else(|| config.database_url().map(String::from))
            .ok_or_else(|| CliError::settings("no database URL"))?;

        let provider = config
            .database
            .resolved_provider(Some(&url))
            .ok_or_else(|| CliError::settings(format!("cannot infer provider from '{url}'")))?;

        Ok(Self {
            config,
            config_dir,
            url,
            provider,
        })
    }

    /// Load and validate the catalog manifest, applying the configured
    /// prefix override. Runs before any connection is opened.
    pub fn catalog(&self) -> CliResult<ManifestCatalog> {
        let path = self.config.catalog_path(&self.config_dir);
        let catalog = ManifestCatalog::from_file(&path)?;
        let catalog = match self.config.namespace_prefix() {
            Some(prefix) => catalog.with_namespace_prefix(prefix),
            None => catalog,
        };
        catalog.list_desired_tables()?;
        Ok(catalog)
    }

    /// Engine configuration from the `[reconcile]` and `[introspection]`
    /// sections.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        let settings = &self.config.introspection;
        let introspection = IntrospectionConfig::new()
            .database_schema(settings.schema.clone())
            .include_tables(settings.include_tables.clone())
            .exclude_tables(settings.exclude_tables.clone());

        ReconcileConfig::new()
            .introspection(introspection)
            .drop_obsolete(self.config.reconcile.drop_obsolete)
            .dry_run(self.config.reconcile.dry_run)
    }

    /// Open a connection to the configured database.
    pub async fn connect(&self) -> CliResult<Box<dyn SchemaConnection>> {
        debug!(provider = self.provider.as_str(), "connecting");
        match self.provider {
            #[cfg(feature = "sqlite")]
            DatabaseProvider::Sqlite => {
                let conn = keel_sqlite::SqliteConnection::connect(&self.url)
                    .await
                    .map_err(|e| CliError::Database(e.to_string()))?;
                Ok(Box::new(conn))
            }
            #[cfg(feature = "postgres")]
            DatabaseProvider::PostgreSql => {
                let config = keel_postgres::PgConfig::from_url(&self.url)
                    .map_err(|e| CliError::settings(e.to_string()))?
                    .schema(self.config.introspection.schema.clone());
                let conn = keel_postgres::PgConnection::open(config)
                    .await
                    .map_err(|e| CliError::Database(e.to_string()))?;
                Ok(Box::new(conn))
            }
            #[allow(unreachable_patterns)]
            other => Err(CliError::settings(format!(
                "keel was built without {} support",
                other.as_str()
            ))),
        }
    }
}
