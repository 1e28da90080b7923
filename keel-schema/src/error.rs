//! Error types for catalog declarations and configuration.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while reading or validating the desired schema.
///
/// Every variant is fatal for a reconciliation run and is raised before the
/// database is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum CatalogError {
    /// Error reading a manifest file.
    #[error("failed to read catalog manifest `{path}`: {message}")]
    #[diagnostic(code(keel::catalog::io_error))]
    Io { path: String, message: String },

    /// The manifest is not valid TOML or does not match the manifest layout.
    #[error("failed to parse catalog manifest: {message}")]
    #[diagnostic(code(keel::catalog::manifest_error))]
    Manifest { message: String },

    /// Two tables share a name.
    #[error("duplicate table `{table}`")]
    #[diagnostic(code(keel::catalog::duplicate_table))]
    DuplicateTable { table: String },

    /// A table declares no columns.
    #[error("table `{table}` declares no columns")]
    #[diagnostic(code(keel::catalog::empty_table))]
    EmptyTable { table: String },

    /// Duplicate column, index or foreign key inside one table.
    #[error("duplicate {kind} `{name}` in table `{table}`")]
    #[diagnostic(code(keel::catalog::duplicate))]
    Duplicate {
        table: String,
        kind: String,
        name: String,
    },

    /// A column was declared without a type.
    #[error("column `{table}.{column}` has no type")]
    #[diagnostic(
        code(keel::catalog::missing_type),
        help("add `type = \"...\"` to the column declaration")
    )]
    MissingColumnType { table: String, column: String },

    /// A column type name is not recognized.
    #[error("unknown type `{type_name}` for column `{table}.{column}`")]
    #[diagnostic(code(keel::catalog::unknown_type))]
    UnknownColumnType {
        table: String,
        column: String,
        type_name: String,
    },

    /// A key, index or foreign key names a column the table does not have.
    #[error("{context} of table `{table}` references unknown column `{column}`")]
    #[diagnostic(code(keel::catalog::unknown_column))]
    UnknownColumn {
        table: String,
        column: String,
        context: String,
    },

    /// Primary-key columns must be NOT NULL.
    #[error("primary key column `{table}.{column}` must not be nullable")]
    #[diagnostic(code(keel::catalog::nullable_primary_key))]
    NullablePrimaryKey { table: String, column: String },

    /// Auto-increment is only valid on a sole integer primary-key column.
    #[error("column `{table}.{column}` cannot auto-increment: {reason}")]
    #[diagnostic(code(keel::catalog::invalid_auto_increment))]
    InvalidAutoIncrement {
        table: String,
        column: String,
        reason: String,
    },

    /// Local and referenced column lists of a foreign key differ in length.
    #[error(
        "foreign key `{name}` of table `{table}` maps {local} column(s) onto {referenced} column(s)"
    )]
    #[diagnostic(code(keel::catalog::foreign_key_arity))]
    ForeignKeyArity {
        table: String,
        name: String,
        local: usize,
        referenced: usize,
    },

    /// An index or foreign key lists no columns.
    #[error("{kind} `{name}` of table `{table}` lists no columns")]
    #[diagnostic(code(keel::catalog::empty_key))]
    EmptyKey {
        table: String,
        kind: String,
        name: String,
    },

    /// A referential action string is not recognized.
    #[error("unknown referential action `{action}` on foreign key `{name}`")]
    #[diagnostic(
        code(keel::catalog::unknown_action),
        help("use one of: no action, restrict, cascade, set null, set default")
    )]
    UnknownReferentialAction { name: String, action: String },
}

impl CatalogError {
    /// Create a duplicate member error.
    pub fn duplicate(
        table: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Duplicate {
            table: table.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an unknown column error.
    pub fn unknown_column(
        table: impl Into<String>,
        column: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
            context: context.into(),
        }
    }

    /// Create an invalid auto-increment error.
    pub fn invalid_auto_increment(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAutoIncrement {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Name of the table the error points at, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Io { .. } | Self::Manifest { .. } | Self::UnknownReferentialAction { .. } => None,
            Self::DuplicateTable { table }
            | Self::EmptyTable { table }
            | Self::Duplicate { table, .. }
            | Self::MissingColumnType { table, .. }
            | Self::UnknownColumnType { table, .. }
            | Self::UnknownColumn { table, .. }
            | Self::NullablePrimaryKey { table, .. }
            | Self::InvalidAutoIncrement { table, .. }
            | Self::ForeignKeyArity { table, .. }
            | Self::EmptyKey { table, .. } => Some(table),
        }
    }
}

/// Errors raised while loading `keel.toml`.
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    /// Error reading the configuration file.
    #[error("failed to read config file: {path}")]
    #[diagnostic(code(keel::config::io_error))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    #[diagnostic(code(keel::config::toml_error))]
    Toml {
        #[source]
        source: toml::de::Error,
    },

    /// Semantically invalid configuration.
    #[error("configuration error: {message}")]
    #[diagnostic(code(keel::config::invalid))]
    Invalid { message: String },
}

impl ConfigError {
    /// Create an invalid configuration error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
