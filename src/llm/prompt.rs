use tracing::debug;

use crate::ingest::schema::TableSchema;
use crate::util::sql::quote_ident;

/// Builds the natural-language-to-SQL prompt for a single table.
pub fn build_prompt(question: &str, schema: &TableSchema) -> String {
    let column_list = schema
        .columns
        .iter()
        .map(|col| quote_ident(&col.name).into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
### Instructions:
Your task is to convert a question into a SQL query for DuckDB, given a table schema.
Adhere to these rules:
- **Be careful with column names - they are case sensitive**
- **Use the exact spelling of column names as provided in the schema**, including the double quotes around names that have them
- Query only the table `{table}`; there are no other tables
- Write exactly one read-only SELECT statement and nothing else
- Limit row listings to at most 100 rows unless the question asks for an aggregate

### Input:
Generate a SQL query that answers the question `{question}`.
This query will run on a DuckDB database with this table:

{ddl}

Columns, in order: {column_list}

### Response:
Based on your instructions, here is the SQL query I have generated to answer the question `{question}`:
```sql
"#,
        table = quote_ident(&schema.name),
        question = question,
        ddl = schema.to_ddl(),
        column_list = column_list,
    )
}

/// Pulls the SQL statement out of free-form model output.
pub fn extract_sql(content: &str) -> String {
    // ```sql ... ``` block, tolerating a missing closing fence
    if let Some(start) = content.find("```sql") {
        let body = &content[start + 6..];
        let end = body.find("```").unwrap_or(body.len());
        let sql = body[..end].trim();
        if !sql.is_empty() {
            debug!("Extracted SQL from fenced block: {}", sql);
            return sql.to_string();
        }
    }

    // Plain ``` ... ``` block
    if let Some(start) = content.find("```") {
        let content_after_first = &content[start + 3..];
        if let Some(end) = content_after_first.find("```") {
            let sql = content_after_first[..end].trim();
            if !sql.is_empty() {
                debug!("Extracted SQL from plain block: {}", sql);
                return sql.to_string();
            }
        }
    }

    // Scan for the first line that opens a statement and collect until a
    // fence or a terminating semicolon
    let sql_keywords = ["SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP"];
    let lines: Vec<&str> = content.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim().to_uppercase();
        if sql_keywords.iter().any(|kw| trimmed.starts_with(kw)) {
            let mut sql = line.trim().to_string();

            if !sql.ends_with(';') {
                for next_line in lines.iter().skip(i + 1).map(|l| l.trim()) {
                    if next_line.starts_with("```") {
                        break;
                    }
                    sql.push(' ');
                    sql.push_str(next_line);
                    if next_line.ends_with(';') {
                        break;
                    }
                }
            }

            let sql = sql.trim().to_string();
            debug!("Extracted SQL by line scanning: {}", sql);
            return sql;
        }
    }

    content.trim().trim_matches('`').trim().to_string()
}
