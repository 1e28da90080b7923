//! SQLite connection: introspection and DDL execution.

use async_trait::async_trait;
use keel_migrate::{
    ColumnInfo, ConstraintInfo, Dialect, IndexInfo, IntrospectionConfig, Introspector,
    ReconcileResult, SchemaConnection, StatementExecutor, TableInfo,
};
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};

const SCHEMA: &str = "main";

/// A single SQLite connection.
///
/// The database is closed when the connection is dropped; an in-memory
/// database goes with it.
pub struct SqliteConnection {
    conn: Connection,
    config: SqliteConfig,
}

impl SqliteConnection {
    /// Open a connection and apply the configuration pragmas.
    pub async fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = if config.path.is_memory() {
            Connection::open_in_memory().await?
        } else {
            Connection::open(config.path_str()).await?
        };

        let init_sql = config.init_sql();
        conn.call(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        })
        .await?;

        debug!(path = %config.path_str(), "Opened SQLite connection");
        Ok(Self { conn, config })
    }

    /// Open a connection from a URL (see [`SqliteConfig::from_url`]).
    pub async fn connect(url: &str) -> SqliteResult<Self> {
        Self::open(SqliteConfig::from_url(url)?).await
    }

    /// Open a fresh in-memory database.
    pub async fn memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory()).await
    }

    /// Get the configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run a batch of statements outside any reconciliation.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Run a query returning a single integer.
    pub async fn query_i64(&self, sql: &str) -> SqliteResult<i64> {
        let sql = sql.to_string();
        let value = self
            .conn
            .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
            .await?;
        Ok(value)
    }

    /// Primary-key columns of `table`, in key order.
    async fn primary_key(&self, table: &str) -> SqliteResult<Vec<String>> {
        let table = table.to_string();
        let columns = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk",
                )?;
                let rows = stmt.query_map([&table], |row| row.get::<_, String>(0))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(columns)
    }

    async fn foreign_keys(&self, table: &str) -> SqliteResult<Vec<ConstraintInfo>> {
        let owner = table.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                // SQLite numbers keys in reverse declaration order.
                let mut stmt = conn.prepare(
                    "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
                     FROM pragma_foreign_key_list(?1) ORDER BY id DESC, seq",
                )?;
                let rows = stmt.query_map([&owner], |row| {
                    Ok(ForeignKeyRow {
                        id: row.get(0)?,
                        referenced_table: row.get(1)?,
                        from: row.get(2)?,
                        to: row.get(3)?,
                        on_update: row.get(4)?,
                        on_delete: row.get(5)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        // Rows of one key are adjacent.
        let mut keys: Vec<(i64, ConstraintInfo)> = Vec::new();
        for row in rows {
            if keys.last().is_none_or(|(id, _)| *id != row.id) {
                keys.push((
                    row.id,
                    ConstraintInfo {
                        name: None,
                        constraint_type: "FOREIGN KEY".to_string(),
                        table_name: table.to_string(),
                        columns: Vec::new(),
                        referenced_table: Some(row.referenced_table.clone()),
                        referenced_columns: Vec::new(),
                        on_delete: Some(row.on_delete.clone()),
                        on_update: Some(row.on_update.clone()),
                    },
                ));
            }
            if let Some((_, key)) = keys.last_mut() {
                key.columns.push(row.from);
                // NULL target columns mean "the referenced primary key".
                if let Some(to) = row.to {
                    key.referenced_columns.push(to);
                }
            }
        }

        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }
}

struct ForeignKeyRow {
    id: i64,
    referenced_table: String,
    from: String,
    to: Option<String>,
    on_update: String,
    on_delete: String,
}

fn declares_autoincrement(sql: &str) -> bool {
    sql.to_ascii_uppercase().contains("AUTOINCREMENT")
}

#[async_trait]
impl Introspector for SqliteConnection {
    async fn begin_read(&mut self) -> ReconcileResult<()> {
        self.execute_batch("BEGIN").await?;
        Ok(())
    }

    async fn end_read(&mut self) -> ReconcileResult<()> {
        self.execute_batch("COMMIT").await?;
        Ok(())
    }

    async fn get_tables(&mut self, _config: &IntrospectionConfig) -> ReconcileResult<Vec<TableInfo>> {
        let names = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(SqliteError::from)?;

        Ok(names
            .into_iter()
            .map(|name| TableInfo::base_table(name, SCHEMA))
            .collect())
    }

    async fn get_columns(&mut self, table: &str, _schema: &str) -> ReconcileResult<Vec<ColumnInfo>> {
        let name = table.to_string();
        let (create_sql, rows) = self
            .conn
            .call(move |conn| {
                let create_sql: Option<String> = conn
                    .query_row(
                        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                        [&name],
                        |row| row.get(0),
                    )?;

                let mut stmt = conn.prepare(
                    "SELECT cid, name, type, \"notnull\", dflt_value, pk \
                     FROM pragma_table_info(?1) ORDER BY cid",
                )?;
                let rows = stmt.query_map([&name], |row| {
                    Ok((
                        row.get::<_, i32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i32>(5)?,
                    ))
                })?;
                let rows = rows.collect::<Result<Vec<_>, _>>()?;
                Ok((create_sql, rows))
            })
            .await
            .map_err(SqliteError::from)?;

        // AUTOINCREMENT is only legal on a sole INTEGER PRIMARY KEY.
        let pk_count = rows.iter().filter(|r| r.5 > 0).count();
        let autoincrement = create_sql.as_deref().is_some_and(declares_autoincrement);

        Ok(rows
            .into_iter()
            .map(|(cid, name, declared, not_null, default, pk)| ColumnInfo {
                is_identity: autoincrement
                    && pk > 0
                    && pk_count == 1
                    && declared.eq_ignore_ascii_case("INTEGER"),
                name,
                data_type: declared.clone(),
                udt_name: declared,
                is_nullable: !not_null,
                column_default: default,
                ordinal_position: cid + 1,
                ..Default::default()
            })
            .collect())
    }

    async fn get_constraints(
        &mut self,
        table: &str,
        _schema: &str,
    ) -> ReconcileResult<Vec<ConstraintInfo>> {
        let mut constraints = Vec::new();

        let primary_key = self.primary_key(table).await?;
        if !primary_key.is_empty() {
            constraints.push(ConstraintInfo::primary_key(table, primary_key));
        }

        constraints.extend(self.foreign_keys(table).await?);
        Ok(constraints)
    }

    async fn get_indexes(&mut self, table: &str, _schema: &str) -> ReconcileResult<Vec<IndexInfo>> {
        let owner = table.to_string();
        let listed = self
            .conn
            .call(move |conn| {
                let mut list = conn.prepare(
                    "SELECT name, \"unique\", origin FROM pragma_index_list(?1) ORDER BY name",
                )?;
                let indexes = list
                    .query_map([&owner], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, bool>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut info = conn.prepare(
                    "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
                )?;
                let mut result = Vec::with_capacity(indexes.len());
                for (name, unique, origin) in indexes {
                    let columns = info
                        .query_map([&name], |row| row.get::<_, Option<String>>(0))?
                        .collect::<Result<Vec<_>, _>>()?;
                    result.push((name, unique, origin, columns));
                }
                Ok(result)
            })
            .await
            .map_err(SqliteError::from)?;

        let mut indexes = Vec::new();
        for (name, unique, origin, columns) in listed {
            // "pk" and "u" indexes back constraints, not CREATE INDEX.
            if origin != "c" {
                debug!(table, index = %name, origin = %origin, "skipping constraint index");
                continue;
            }
            let Some(columns) = columns.into_iter().collect::<Option<Vec<_>>>() else {
                warn!(table, index = %name, "skipping expression index");
                continue;
            };
            indexes.push(IndexInfo {
                name,
                table_name: table.to_string(),
                columns,
                is_unique: unique,
                is_primary: false,
            });
        }
        Ok(indexes)
    }
}

#[async_trait]
impl StatementExecutor for SqliteConnection {
    async fn execute(&mut self, statement: &str) -> ReconcileResult<()> {
        if let Err(err) = self.execute_batch(statement).await {
            // A rebuild stopped halfway must not leave enforcement off.
            let restore = self.config.foreign_keys_sql();
            if let Err(restore_err) = self.execute_batch(&restore).await {
                warn!(error = %restore_err, "failed to restore foreign_keys pragma");
            }
            return Err(err.into());
        }
        Ok(())
    }
}

impl SchemaConnection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}
