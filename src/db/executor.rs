use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info};

use crate::db::{with_connection, DbError, DbPool};

/// Rows produced by one statement, keyed by column name in column order.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub execution_time_ms: u64,
}

#[derive(Clone)]
pub struct QueryExecutor {
    pool: DbPool,
}

impl QueryExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Executes `sql` and materializes the full result. Engine failures come
    /// back as `DbError::Execution` carrying the raw DuckDB message.
    pub async fn run(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let sql = sql.to_string();
        with_connection(&self.pool, move |conn| run_blocking(conn, &sql)).await
    }
}

fn run_blocking(conn: &Connection, sql: &str) -> Result<QueryOutput, DbError> {
    let start_time = Instant::now();
    debug!("Executing SQL: {}", sql);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DbError::Execution(e.to_string()))?;

    let arrow_batch = stmt
        .query_arrow([])
        .map_err(|e| DbError::Execution(e.to_string()))?;

    let schema = arrow_batch.get_schema();
    let columns = schema
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<String>>();

    let record_batches: Vec<RecordBatch> = arrow_batch.collect();
    let rows = batches_to_rows(&record_batches)?;

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    info!("Query returned {} rows in {}ms", rows.len(), execution_time_ms);

    Ok(QueryOutput {
        columns,
        rows,
        execution_time_ms,
    })
}

fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Map<String, Value>>, DbError> {
    if batches.iter().all(|batch| batch.num_rows() == 0) {
        return Ok(Vec::new());
    }

    // Nulls stay as explicit JSON nulls so every row carries every column
    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());

    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer
        .write_batches(&refs)
        .map_err(|e| DbError::Execution(format!("Failed to encode rows: {}", e)))?;
    writer
        .finish()
        .map_err(|e| DbError::Execution(format!("Failed to encode rows: {}", e)))?;

    serde_json::from_slice(&writer.into_inner())
        .map_err(|e| DbError::Execution(format!("Failed to decode rows: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    async fn seeded() -> QueryExecutor {
        let pool = memory_pool();
        with_connection(&pool, |conn| {
            conn.execute_batch(
                "CREATE TABLE people (name VARCHAR, age BIGINT, score DOUBLE);
                 INSERT INTO people VALUES ('ada', 36, 9.5), ('bob', NULL, 7.25), ('cy', 20, NULL);",
            )
            .map_err(|e| DbError::Execution(e.to_string()))
        })
        .await
        .unwrap();
        QueryExecutor::new(pool)
    }

    #[tokio::test]
    async fn test_rows_keep_column_order_and_nulls() {
        let executor = seeded().await;
        let output = executor
            .run("SELECT name, age, score FROM people ORDER BY name")
            .await
            .unwrap();

        assert_eq!(output.columns, vec!["name", "age", "score"]);
        assert_eq!(output.rows.len(), 3);

        let first = &output.rows[0];
        let keys: Vec<&String> = first.keys().collect();
        assert_eq!(keys, vec!["name", "age", "score"]);
        assert_eq!(first["name"], Value::from("ada"));
        assert_eq!(first["age"], Value::from(36));
        assert_eq!(output.rows[1]["age"], Value::Null);
    }

    #[tokio::test]
    async fn test_aggregates_and_empty_results() {
        let executor = seeded().await;
        let output = executor.run("SELECT COUNT(*) as count FROM people").await.unwrap();
        assert_eq!(output.rows[0]["count"], Value::from(3));

        let empty = executor.run("SELECT * FROM people WHERE age > 100").await.unwrap();
        assert_eq!(empty.columns, vec!["name", "age", "score"]);
        assert!(empty.rows.is_empty());
    }

    #[tokio::test]
    async fn test_engine_errors_surface_raw_message() {
        let executor = seeded().await;
        let err = executor.run("SELECT missing_column FROM people").await.unwrap_err();
        match err {
            DbError::Execution(msg) => assert!(msg.contains("missing_column")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
