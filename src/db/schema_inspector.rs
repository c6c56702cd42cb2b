use duckdb::Connection;
use tracing::{debug, warn};

use crate::db::{with_connection, DbError, DbPool};
use crate::ingest::schema::{ColumnSchema, DataType, TableSchema};
use crate::util::sql::{quote_ident, quote_literal};

/// Read-only view of table structure in the DuckDB catalog.
#[derive(Clone)]
pub struct SchemaInspector {
    pool: DbPool,
}

impl SchemaInspector {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Columns and row count in one round trip; fails with
    /// `DbError::SchemaLookup` when the table does not exist.
    pub async fn describe(&self, table: &str) -> Result<(TableSchema, u64), DbError> {
        let table = table.to_string();
        with_connection(&self.pool, move |conn| {
            let columns = table_columns(conn, &table)?;
            let row_count = table_row_count(conn, &table)?;
            Ok((TableSchema { name: table, columns }, row_count))
        })
        .await
    }
}

/// Ordered columns of `table`.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnSchema>, DbError> {
    let pragma = format!("PRAGMA table_info({})", quote_literal(table));

    let mut stmt = conn.prepare(&pragma).map_err(|e| {
        debug!("table_info failed for {}: {}", table, e);
        DbError::SchemaLookup(table.to_string())
    })?;

    let column_iter = stmt
        .query_map([], |row| {
            // notnull comes back as bool or int depending on the DuckDB version
            let is_not_null = match row.get::<_, bool>(3) {
                Ok(value) => value,
                Err(_) => row.get::<_, i32>(3)? != 0,
            };

            Ok(ColumnSchema {
                name: row.get(1)?,
                data_type: DataType::from_sql_type(&row.get::<_, String>(2)?),
                nullable: !is_not_null,
            })
        })
        .map_err(|e| {
            debug!("table_info failed for {}: {}", table, e);
            DbError::SchemaLookup(table.to_string())
        })?;

    let columns = column_iter
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            warn!("Failed to read column info for {}: {}", table, e);
            DbError::SchemaLookup(table.to_string())
        })?;

    if columns.is_empty() {
        return Err(DbError::SchemaLookup(table.to_string()));
    }

    Ok(columns)
}

pub(crate) fn table_row_count(conn: &Connection, table: &str) -> Result<u64, DbError> {
    let count_sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count = conn
        .query_row(&count_sql, [], |row| row.get::<_, i64>(0))
        .map_err(|e| {
            debug!("row count failed for {}: {}", table, e);
            DbError::SchemaLookup(table.to_string())
        })?;
    Ok(count.max(0) as u64)
}
