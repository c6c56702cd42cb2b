use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::{Mutex, PoisonError};

use crate::db::DbError;

/// Hands out clones of one DuckDB database so every pooled connection sees
/// the same catalog, including for `:memory:` databases.
pub struct DuckDBConnectionManager {
    base: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: &str) -> Result<Self, DbError> {
        let base = if connection_string == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(connection_string)
        }
        .map_err(|e| DbError::Pool(e.to_string()))?;

        Ok(Self {
            base: Mutex::new(base),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = DbError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let base = self.base.lock().unwrap_or_else(PoisonError::into_inner);
        base.try_clone().map_err(|e| DbError::Pool(e.to_string()))
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])
            .map_err(|e| DbError::Pool(e.to_string()))?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
