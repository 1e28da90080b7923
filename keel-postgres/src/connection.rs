//! PostgreSQL connection: introspection and DDL execution.

use async_trait::async_trait;
use keel_migrate::{
    ColumnInfo, ConstraintInfo, Dialect, IndexInfo, IntrospectionConfig, Introspector,
    ReconcileResult, SchemaConnection, StatementExecutor, TableInfo,
};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, warn};

use crate::config::PgConfig;
use crate::error::{PgError, PgResult};

/// Catalog queries.
pub mod queries {
    /// Tables and views of a schema.
    pub const TABLES: &str = r#"
        SELECT
            table_name::text,
            table_schema::text,
            table_type::text
        FROM information_schema.tables
        WHERE table_schema::text = $1
        ORDER BY table_name
    "#;

    /// Columns of a table, with identity and serial columns flagged.
    pub const COLUMNS: &str = r#"
        SELECT
            column_name::text,
            data_type::text,
            udt_name::text,
            character_maximum_length::int4,
            numeric_precision::int4,
            numeric_scale::int4,
            is_nullable = 'YES' AS is_nullable,
            column_default::text,
            ordinal_position::int4,
            (is_identity = 'YES' OR coalesce(column_default, '') LIKE 'nextval(%') AS is_identity
        FROM information_schema.columns
        WHERE table_schema::text = $1 AND table_name::text = $2
        ORDER BY ordinal_position
    "#;

    /// Primary-key and foreign-key constraints, columns in key order.
    pub const CONSTRAINTS: &str = r#"
        SELECT
            con.conname::text,
            CASE con.contype WHEN 'p' THEN 'PRIMARY KEY' ELSE 'FOREIGN KEY' END AS constraint_type,
            ARRAY(
                SELECT a.attname::text
                FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                ORDER BY k.ord
            ) AS columns,
            ref.relname::text AS referenced_table,
            ARRAY(
                SELECT a.attname::text
                FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                ORDER BY k.ord
            ) AS referenced_columns,
            con.confdeltype::text,
            con.confupdtype::text
        FROM pg_constraint con
        JOIN pg_class t ON t.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        LEFT JOIN pg_class ref ON ref.oid = con.confrelid
        WHERE n.nspname::text = $1 AND t.relname::text = $2 AND con.contype IN ('p', 'f')
        ORDER BY con.contype DESC, con.conname
    "#;

    /// Indexes not backing a constraint.
    pub const INDEXES: &str = r#"
        SELECT
            i.relname::text AS index_name,
            t.relname::text AS table_name,
            ARRAY(
                SELECT a.attname::text
                FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
                ORDER BY k.ord
            ) AS columns,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary,
            (ix.indexprs IS NOT NULL OR ix.indpred IS NOT NULL) AS is_partial
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        WHERE n.nspname::text = $1 AND t.relname::text = $2
          AND NOT EXISTS (
              SELECT 1 FROM pg_constraint c
              WHERE c.conindid = ix.indexrelid AND c.contype IN ('p', 'u', 'x')
          )
        ORDER BY i.relname
    "#;
}

/// A single PostgreSQL connection.
///
/// The connection driver runs on a spawned task and stops when the client
/// is dropped.
pub struct PgConnection {
    client: Client,
    config: PgConfig,
}

impl PgConnection {
    /// Connect with the given configuration.
    pub async fn open(config: PgConfig) -> PgResult<Self> {
        let (client, connection) = config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| PgError::connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        debug!(host = %config.host, database = %config.database, "Opened PostgreSQL connection");
        Ok(Self { client, config })
    }

    /// Connect from a URL (see [`PgConfig::from_url`]).
    pub async fn connect(url: &str) -> PgResult<Self> {
        Self::open(PgConfig::from_url(url)?).await
    }

    /// Get the configuration.
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    /// Run a batch of statements outside any reconciliation.
    pub async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query(&self, sql: &str, table: Option<&str>, schema: &str) -> PgResult<Vec<Row>> {
        let rows = match table {
            Some(table) => self.client.query(sql, &[&schema, &table]).await?,
            None => self.client.query(sql, &[&schema]).await?,
        };
        Ok(rows)
    }
}

/// Map a `confdeltype`/`confupdtype` code to its SQL keyword.
fn referential_action(code: Option<String>) -> PgResult<Option<String>> {
    let Some(code) = code else {
        return Ok(None);
    };
    let action = match code.as_str() {
        "a" => "NO ACTION",
        "r" => "RESTRICT",
        "c" => "CASCADE",
        "n" => "SET NULL",
        "d" => "SET DEFAULT",
        " " | "" => return Ok(None),
        other => {
            return Err(PgError::introspection(format!(
                "unknown referential action code '{other}'"
            )));
        }
    };
    Ok(Some(action.to_string()))
}

fn constraint_from_row(table: &str, row: &Row) -> PgResult<ConstraintInfo> {
    let constraint_type: String = row.try_get(1)?;
    let is_foreign = constraint_type == "FOREIGN KEY";
    Ok(ConstraintInfo {
        name: Some(row.try_get(0)?),
        constraint_type,
        table_name: table.to_string(),
        columns: row.try_get(2)?,
        referenced_table: row.try_get(3)?,
        referenced_columns: row.try_get(4)?,
        on_delete: if is_foreign { referential_action(row.try_get(5)?)? } else { None },
        on_update: if is_foreign { referential_action(row.try_get(6)?)? } else { None },
    })
}

#[async_trait]
impl Introspector for PgConnection {
    async fn begin_read(&mut self) -> ReconcileResult<()> {
        self.batch_execute("BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .await?;
        Ok(())
    }

    async fn end_read(&mut self) -> ReconcileResult<()> {
        self.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn get_tables(&mut self, config: &IntrospectionConfig) -> ReconcileResult<Vec<TableInfo>> {
        let rows = self
            .query(queries::TABLES, None, &config.database_schema)
            .await?;
        let tables = rows
            .iter()
            .map(|row| -> PgResult<TableInfo> {
                Ok(TableInfo {
                    name: row.try_get(0)?,
                    schema: row.try_get(1)?,
                    table_type: row.try_get(2)?,
                })
            })
            .collect::<PgResult<Vec<_>>>()?;
        Ok(tables)
    }

    async fn get_columns(&mut self, table: &str, schema: &str) -> ReconcileResult<Vec<ColumnInfo>> {
        let rows = self.query(queries::COLUMNS, Some(table), schema).await?;
        let columns = rows
            .iter()
            .map(|row| -> PgResult<ColumnInfo> {
                Ok(ColumnInfo {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    udt_name: row.try_get(2)?,
                    character_maximum_length: row.try_get(3)?,
                    numeric_precision: row.try_get(4)?,
                    numeric_scale: row.try_get(5)?,
                    is_nullable: row.try_get(6)?,
                    column_default: row.try_get(7)?,
                    ordinal_position: row.try_get(8)?,
                    is_identity: row.try_get(9)?,
                })
            })
            .collect::<PgResult<Vec<_>>>()?;
        Ok(columns)
    }

    async fn get_constraints(
        &mut self,
        table: &str,
        schema: &str,
    ) -> ReconcileResult<Vec<ConstraintInfo>> {
        let rows = self.query(queries::CONSTRAINTS, Some(table), schema).await?;
        let constraints = rows
            .iter()
            .map(|row| constraint_from_row(table, row))
            .collect::<PgResult<Vec<_>>>()?;
        Ok(constraints)
    }

    async fn get_indexes(&mut self, table: &str, schema: &str) -> ReconcileResult<Vec<IndexInfo>> {
        let rows = self.query(queries::INDEXES, Some(table), schema).await?;
        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get(0).map_err(PgError::from)?;
            let is_partial: bool = row.try_get(5).map_err(PgError::from)?;
            if is_partial {
                warn!(table, index = %name, "skipping expression or partial index");
                continue;
            }
            indexes.push(IndexInfo {
                name,
                table_name: row.try_get(1).map_err(PgError::from)?,
                columns: row.try_get(2).map_err(PgError::from)?,
                is_unique: row.try_get(3).map_err(PgError::from)?,
                is_primary: row.try_get(4).map_err(PgError::from)?,
            });
        }
        Ok(indexes)
    }
}

#[async_trait]
impl StatementExecutor for PgConnection {
    async fn execute(&mut self, statement: &str) -> ReconcileResult<()> {
        self.batch_execute(statement).await?;
        Ok(())
    }
}

impl SchemaConnection for PgConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referential_action() {
        assert_eq!(referential_action(Some("c".into())).unwrap().as_deref(), Some("CASCADE"));
        assert_eq!(referential_action(Some("n".into())).unwrap().as_deref(), Some("SET NULL"));
        assert_eq!(referential_action(Some("a".into())).unwrap().as_deref(), Some("NO ACTION"));
        assert_eq!(referential_action(Some(" ".into())).unwrap(), None);
        assert_eq!(referential_action(None).unwrap(), None);
        assert!(referential_action(Some("z".into())).is_err());
    }

    #[test]
    fn test_queries_are_schema_scoped() {
        for query in [
            queries::TABLES,
            queries::COLUMNS,
            queries::CONSTRAINTS,
            queries::INDEXES,
        ] {
            assert!(query.contains("$1"));
        }
        for query in [queries::COLUMNS, queries::CONSTRAINTS, queries::INDEXES] {
            assert!(query.contains("$2"));
        }
    }

    #[test]
    fn test_constraint_queries_skip_backing_indexes() {
        assert!(queries::INDEXES.contains("conindid"));
        assert!(queries::CONSTRAINTS.contains("WITH ORDINALITY"));
    }
}
