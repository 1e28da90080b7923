//! Configuration file parsing for `keel.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::naming::namespace_prefix_for_handle;

/// Main configuration structure for `keel.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeelConfig {
    /// The package whose tables are reconciled.
    #[serde(default)]
    pub package: PackageConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Reconciliation behaviour.
    #[serde(default)]
    pub reconcile: ReconcileSettings,

    /// Schema introspection scope.
    #[serde(default)]
    pub introspection: IntrospectionSettings,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl KeelConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        // First, expand environment variables
        let expanded = expand_env_vars(content)?;

        toml::from_str(&expanded).map_err(|e| ConfigError::Toml { source: e })
    }

    /// Get the database URL.
    pub fn database_url(&self) -> Option<&str> {
        self.database.url.as_deref()
    }

    /// The namespace prefix: the explicit override, else derived from the
    /// package handle.
    pub fn namespace_prefix(&self) -> Option<String> {
        self.package.namespace_prefix.clone().or_else(|| {
            self.package
                .handle
                .as_deref()
                .map(namespace_prefix_for_handle)
        })
    }

    /// The catalog manifest path, resolved against the directory holding
    /// the config file.
    pub fn catalog_path(&self, config_dir: &Path) -> PathBuf {
        let path = Path::new(&self.package.catalog);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            config_dir.join(path)
        }
    }
}

/// Package configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    /// Package handle, e.g. `acme_blog`.
    pub handle: Option<String>,

    /// Explicit table-name prefix; wins over the one derived from `handle`.
    pub namespace_prefix: Option<String>,

    /// Path to the catalog manifest.
    #[serde(default = "default_catalog_path")]
    pub catalog: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            handle: None,
            namespace_prefix: None,
            catalog: default_catalog_path(),
        }
    }
}

fn default_catalog_path() -> String {
    "catalog.toml".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database provider; inferred from the URL when omitted.
    pub provider: Option<DatabaseProvider>,

    /// Connection URL.
    pub url: Option<String>,
}

impl DatabaseConfig {
    /// The configured provider, or the one implied by `url`.
    pub fn resolved_provider(&self, url: Option<&str>) -> Option<DatabaseProvider> {
        self.provider
            .or_else(|| url.or(self.url.as_deref()).and_then(DatabaseProvider::from_url))
    }
}

/// Supported database providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    /// PostgreSQL.
    #[serde(alias = "postgres")]
    PostgreSql,
    /// SQLite.
    Sqlite,
}

impl DatabaseProvider {
    /// Infer the provider from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split_once(':').map(|(s, _)| s)?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::PostgreSql),
            "sqlite" | "file" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Get the provider name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Reconciliation behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileSettings {
    /// Drop namespace tables that no longer appear in the catalog.
    #[serde(default = "default_true")]
    pub drop_obsolete: bool,

    /// Plan without executing.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            drop_obsolete: true,
            dry_run: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Introspection scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IntrospectionSettings {
    /// Database schema to read (PostgreSQL).
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Only read these tables (empty means all).
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Never read these tables.
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

impl Default for IntrospectionSettings {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }
}

fn default_schema() -> String {
    "public".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// Unset variables are left untouched so the TOML error points at them.
fn expand_env_vars(content: &str) -> ConfigResult<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::invalid(format!("env pattern: {e}")))?;

    let expanded = re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = &caps[1], "environment variable not set");
                caps[0].to_string()
            }
        }
    });

    Ok(expanded.into_owned())
}
