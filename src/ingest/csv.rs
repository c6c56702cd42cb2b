use duckdb::Connection;
use std::path::Path;
use tracing::{info, warn};

use crate::db::schema_inspector::{table_columns, table_row_count};
use crate::ingest::schema::TableSchema;
use crate::ingest::{IngestError, IngestReport};
use crate::util::sql::{quote_ident, quote_literal};

#[derive(Clone)]
pub struct CsvIngestor {
    delimiter: u8,
}

impl CsvIngestor {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    /// Reads the whole file once with the `csv` reader so malformed input is
    /// rejected before the existing table is touched. Returns the header and
    /// the number of data records.
    fn preflight(&self, path: &Path) -> Result<(Vec<String>, u64), IngestError> {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_path(path)
            .map_err(|e| IngestError::ParsingError(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| IngestError::ParsingError(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(IngestError::ParsingError("CSV file has no header row".to_string()));
        }

        let mut records = 0u64;
        for record in reader.records() {
            record.map_err(|e| IngestError::ParsingError(e.to_string()))?;
            records += 1;
        }

        Ok((headers, records))
    }

    pub fn ingest(&self, conn: &Connection, path: &Path, table_name: &str) -> Result<IngestReport, IngestError> {
        let (headers, records) = self.preflight(path)?;
        info!("CSV {} has {} columns and {} records", path.display(), headers.len(), records);

        let absolute_path = path.canonicalize()?;

        // CREATE OR REPLACE swaps the table in one statement
        let create_sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_csv_auto({}, header = true, delim = {})",
            quote_ident(table_name),
            quote_literal(&absolute_path.to_string_lossy()),
            quote_literal(&(self.delimiter as char).to_string()),
        );

        info!("Executing SQL: {}", create_sql);
        conn.execute(&create_sql, [])
            .map_err(|e| IngestError::DatabaseError(format!("Failed to create table: {}", e)))?;

        let columns = table_columns(conn, table_name)?;
        let rows_processed = table_row_count(conn, table_name)?;

        if rows_processed != records {
            warn!(
                "Row count mismatch for {}: csv reader saw {}, table has {}",
                table_name, records, rows_processed
            );
        }

        Ok(IngestReport {
            schema: TableSchema {
                name: table_name.to_string(),
                columns,
            },
            rows_processed,
        })
    }
}

impl Default for CsvIngestor {
    fn default() -> Self {
        Self::new()
    }
}
