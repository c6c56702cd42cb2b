use serde::{Deserialize, Serialize};

use crate::util::sql::quote_ident;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    BigInt,
    Double,
    String,
    Boolean,
    Date,
    Timestamp,
    Unknown(String),
}

impl DataType {
    /// Maps a DuckDB declared type (as reported by `PRAGMA table_info`).
    pub fn from_sql_type(declared: &str) -> Self {
        match declared.to_lowercase().as_str() {
            "integer" => DataType::Integer,
            "bigint" => DataType::BigInt,
            "double" => DataType::Double,
            "varchar" | "text" => DataType::String,
            "boolean" => DataType::Boolean,
            "date" => DataType::Date,
            "timestamp" => DataType::Timestamp,
            _ => DataType::Unknown(declared.to_string()),
        }
    }

    /// Text and boolean columns: the ones worth grouping by.
    pub fn is_categorical(&self) -> bool {
        matches!(self, DataType::String | DataType::Boolean)
    }

    pub fn to_sql_type(&self) -> String {
        match self {
            DataType::Integer => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::String => "VARCHAR".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Unknown(t) => t.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn to_sql_definition(&self) -> String {
        let nullable_str = if self.nullable { "" } else { " NOT NULL" };
        format!("{} {}{}", quote_ident(&self.name), self.data_type.to_sql_type(), nullable_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// DDL for the table, used as LLM context. Column names that are not
    /// plain identifiers come out double-quoted.
    pub fn to_ddl(&self) -> String {
        let columns_sql: Vec<String> = self.columns
            .iter()
            .map(|col| col.to_sql_definition())
            .collect();

        format!(
            "CREATE TABLE {} (\n    {}\n);",
            quote_ident(&self.name),
            columns_sql.join(",\n    ")
        )
    }
}
