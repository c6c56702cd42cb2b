pub mod db_pool;
pub mod executor;
pub mod schema_inspector;

use crate::config::DatabaseConfig;
use crate::db::db_pool::DuckDBConnectionManager;
use duckdb::Connection;
use r2d2::Pool;
use thiserror::Error;

pub type DbPool = Pool<DuckDBConnectionManager>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Table '{0}' does not exist")]
    SchemaLookup(String),
    #[error("{0}")]
    Execution(String),
    #[error("Database connection error: {0}")]
    Pool(String),
    #[error("Database task failed: {0}")]
    Task(String),
}

pub fn build_pool(config: &DatabaseConfig) -> Result<DbPool, DbError> {
    let manager = DuckDBConnectionManager::new(&config.connection_string)?;
    Pool::builder()
        .max_size(config.pool_size.max(1) as u32)
        .build(manager)
        .map_err(|e| DbError::Pool(e.to_string()))
}

/// Runs `f` on a pooled connection in a blocking task.
pub async fn with_connection<T, F>(pool: &DbPool, f: F) -> Result<T, DbError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| DbError::Pool(e.to_string()))?;
        f(&conn)
    })
    .await
    .map_err(|e| DbError::Task(e.to_string()))?
}

#[cfg(test)]
pub(crate) fn memory_pool() -> DbPool {
    build_pool(&DatabaseConfig {
        connection_string: ":memory:".to_string(),
        pool_size: 2,
    })
    .expect("in-memory duckdb")
}
