//! Heuristic gate for SQL that did not come from the rule engine.
//!
//! This is a blocklist, not a parser: it keeps obviously mutating or
//! multi-statement text away from the engine and rejects output that does
//! not look like it reads the known table.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsafeSql {
    #[error("multiple statements")]
    MultipleStatements,
    #[error("forbidden operation")]
    ForbiddenOperation(String),
    #[error("not a read-only query")]
    NotReadOnly,
    #[error("unrecognized columns")]
    UnrecognizedColumns,
}

const FORBIDDEN: &[&str] = &["delete", "update", "insert", "drop", "alter", "create"];

/// DuckDB statements and table functions that write, reach the filesystem
/// or change settings.
const FORBIDDEN_ENGINE: &[&str] = &[
    "attach", "detach", "copy", "pragma", "install", "load", "export", "import", "truncate",
    "read_csv", "read_csv_auto", "csv_scan", "sniff_csv", "read_parquet", "parquet_scan",
    "parquet_metadata", "parquet_schema", "read_json", "read_json_auto", "read_json_objects",
    "read_json_objects_auto", "read_ndjson", "read_ndjson_auto", "read_ndjson_objects",
    "read_text", "read_blob", "glob", "iceberg_scan", "delta_scan", "query_table",
];

/// A string literal, or a quoted name that looks like a path, used as a
/// table source. DuckDB resolves these to files.
static FILE_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+(?:'|"[^"]*[./\\][^"]*")"#).expect("valid file source regex")
});

const AGGREGATES: &[&str] = &["count(", "avg(", "sum("];

/// Classifies `sql`. The first failing check decides the reason.
pub fn validate(sql: &str, known_columns: &[String]) -> Result<(), UnsafeSql> {
    let trimmed = sql.trim();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    if body.contains(';') {
        return Err(UnsafeSql::MultipleStatements);
    }

    let lowered = body.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(word) = tokens
        .iter()
        .find(|t| FORBIDDEN.contains(*t) || FORBIDDEN_ENGINE.contains(*t))
    {
        return Err(UnsafeSql::ForbiddenOperation(word.to_string()));
    }

    if FILE_SOURCE.is_match(body) {
        return Err(UnsafeSql::ForbiddenOperation("file source".to_string()));
    }

    if !matches!(tokens.first(), Some(&"select") | Some(&"with")) {
        return Err(UnsafeSql::NotReadOnly);
    }

    // Statements without a FROM read no table, so no column can be unknown
    let reads_table = tokens.contains(&"from");
    let compact = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let recognized = lowered.contains('*')
        || known_columns
            .iter()
            .any(|column| lowered.contains(&column.to_lowercase()))
        || AGGREGATES.iter().any(|agg| compact.replace(" (", "(").contains(agg))
        || compact.contains("group by");

    if reads_table && !recognized {
        return Err(UnsafeSql::UnrecognizedColumns);
    }

    Ok(())
}
