pub mod csv;
pub mod schema;

use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::db::{with_connection, DbError, DbPool};
use crate::ingest::schema::TableSchema;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

impl From<DbError> for IngestError {
    fn from(err: DbError) -> Self {
        IngestError::DatabaseError(err.to_string())
    }
}

/// Outcome of loading one file into a table.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub schema: TableSchema,
    pub rows_processed: u64,
}

const RESERVED_NAMES: &[&str] = &[
    "select", "from", "where", "group", "order", "by", "limit", "table", "join", "union",
    "having", "and", "or", "not", "null", "as", "on", "in", "is", "case", "when", "values",
];

/// Turns an uploaded file name into the table identifier used in SQL.
///
/// `"Iris Data-2024.csv"` becomes `iris_data_2024`. The result only ever
/// contains `[a-z0-9_]`, does not start with a digit and is never a bare
/// SQL keyword, so it can be interpolated unquoted.
pub fn normalize_table_name(file_name: &str) -> String {
    let split = file_name.len().saturating_sub(4);
    let stem = if file_name.is_char_boundary(split) && file_name[split..].eq_ignore_ascii_case(".csv") {
        &file_name[..split]
    } else {
        file_name
    };

    let mut name: String = stem
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect();

    if name.is_empty() {
        name = "dataset".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name = format!("t_{}", name);
    }
    if RESERVED_NAMES.contains(&name.as_str()) {
        name.push_str("_data");
    }
    name
}

pub struct IngestManager {
    pool: DbPool,
    csv_ingestor: csv::CsvIngestor,
}

impl IngestManager {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            csv_ingestor: csv::CsvIngestor::new(),
        }
    }

    /// Loads `path` into `table_name`, discarding any previous table of that name.
    pub async fn ingest_file(&self, path: &Path, table_name: &str) -> Result<IngestReport, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| IngestError::UnsupportedFileType("No extension".to_string()))?;

        if !extension.eq_ignore_ascii_case("csv") {
            return Err(IngestError::UnsupportedFileType(extension.to_string()));
        }

        let ingestor = self.csv_ingestor.clone();
        let path = path.to_path_buf();
        let table_name = table_name.to_string();

        let result = with_connection(&self.pool, move |conn| {
            Ok(ingestor.ingest(conn, &path, &table_name))
        })
        .await?;

        let report = result?;
        info!(
            "Ingested {} rows into table {} ({} columns)",
            report.rows_processed,
            report.schema.name,
            report.schema.columns.len()
        );
        Ok(report)
    }
}
