use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::ingest::normalize_table_name;
use crate::resolve::{QuerySource, ResolvedQuery};
use crate::web::state::{AppState, DatasetView};

const NO_DATA_MESSAGE: &str = "No CSV file uploaded. Please upload a CSV file to get started.";
const NO_DATA_ERROR: &str = "No CSV file uploaded. Please upload a CSV file first.";

// Query types

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct AiQueryRequest {
    pub query: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct QueryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub query: String,
    pub sql_generated: String,
    pub confidence: f64,
    pub results: Vec<Map<String, Value>>,
    pub total_results: usize,
    pub metadata: QueryMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<QuerySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl QueryResponse {
    fn failure(query: &str, sql: &str, error: String) -> Self {
        Self {
            success: false,
            query: query.to_string(),
            sql_generated: sql.to_string(),
            confidence: 0.0,
            results: Vec::new(),
            total_results: 0,
            metadata: QueryMetadata {
                error_details: Some(error.clone()),
                ..Default::default()
            },
            error: Some(error),
            source: None,
            fallback_reason: None,
        }
    }
}

// Schema types

#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub success: bool,
    pub database_name: String,
    pub table_name: Option<String>,
    pub tables: Vec<TableInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_for_upload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// Upload types

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub table_name: String,
    pub rows_processed: u64,
    pub columns: Vec<String>,
}

fn database_name(table: Option<&str>) -> String {
    match table {
        Some(table) => format!("Dynamic Database ({})", table),
        None => "Dynamic Database (No Data)".to_string(),
    }
}

// API Implementations

pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "NL query backend is running",
        "status": "ok",
        "started_at": state.startup_time.to_rfc3339(),
    }))
}

pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<Value> {
    let table = state.active_table().await;
    Json(json!({
        "connections": [{
            "id": "dynamic",
            "name": database_name(table.as_deref()),
            "type": "duckdb",
            "status": "connected",
        }]
    }))
}

// Schema
pub async fn get_schema(State(state): State<Arc<AppState>>) -> Json<SchemaResponse> {
    let dataset = state.read_dataset().await;
    let Some(table) = dataset.table_name().map(str::to_string) else {
        return Json(SchemaResponse {
            success: true,
            database_name: database_name(None),
            table_name: None,
            tables: Vec::new(),
            message: Some(NO_DATA_MESSAGE.to_string()),
            waiting_for_upload: Some(true),
            error: None,
        });
    };

    match dataset.describe(&table).await {
        Ok((schema, row_count)) => Json(SchemaResponse {
            success: true,
            database_name: database_name(Some(&table)),
            table_name: Some(table),
            tables: vec![TableInfo {
                name: schema.name,
                row_count,
                columns: schema
                    .columns
                    .into_iter()
                    .map(|col| ColumnInfo {
                        name: col.name,
                        data_type: col.data_type.to_sql_type(),
                    })
                    .collect(),
            }],
            message: None,
            waiting_for_upload: None,
            error: None,
        }),
        Err(e) => {
            error!("Failed to describe table {}: {}", table, e);
            Json(SchemaResponse {
                success: false,
                database_name: database_name(Some(&table)),
                table_name: Some(table),
                tables: Vec::new(),
                message: None,
                waiting_for_upload: None,
                error: Some(e.to_string()),
            })
        }
    }
}

// File upload
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart body: {}", e);
        (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e))
    })? {
        if field.name() != Some("file") {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if !file_name.to_lowercase().ends_with(".csv") {
            return Err((StatusCode::BAD_REQUEST, "Only CSV files are allowed".to_string()));
        }

        let contents = field.bytes().await.map_err(|e| {
            error!("Failed to read uploaded file: {}", e);
            (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e))
        })?;

        upload = Some((file_name, contents));
        break;
    }

    let (file_name, contents) =
        upload.ok_or_else(|| (StatusCode::BAD_REQUEST, "No file provided".to_string()))?;

    let table_name = normalize_table_name(&file_name);
    info!("Uploading {} ({} bytes) as table {}", file_name, contents.len(), table_name);

    let dataset = state
        .replace_dataset(&table_name, &contents)
        .await
        .map_err(|e| {
            error!("Upload of {} failed: {}", file_name, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Upload failed: {}", e))
        })?;

    Ok(Json(UploadResponse {
        success: true,
        message: format!("Successfully uploaded {}", file_name),
        table_name: dataset.table_name,
        rows_processed: dataset.row_count,
        columns: dataset.columns.into_iter().map(|c| c.name).collect(),
    }))
}

// Rule-based query
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Json<QueryResponse> {
    let dataset = state.read_dataset().await;
    let Some(table) = dataset.table_name().map(str::to_string) else {
        return Json(QueryResponse::failure(&payload.query, "", NO_DATA_ERROR.to_string()));
    };

    let schema = match dataset.describe(&table).await {
        Ok((schema, _)) => schema,
        Err(e) => {
            error!("Schema lookup failed for {}: {}", table, e);
            return Json(QueryResponse::failure(&payload.query, "", e.to_string()));
        }
    };

    let resolved = ResolvedQuery::rule_based(&payload.query, &schema);
    Json(execute_resolved(&dataset, &payload.query, &table, resolved, false).await)
}

// Model-assisted query with rule-based fallback
pub async fn ai_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AiQueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let question = payload
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Field 'query' is required".to_string()))?;

    // Held until execution so an upload cannot swap the table after the SQL
    // was checked against its columns
    let dataset = state.read_dataset().await;
    let table = match payload.table.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(table) => normalize_table_name(table),
        None => match dataset.table_name() {
            Some(table) => table.to_string(),
            None => return Ok(Json(QueryResponse::failure(&question, "", NO_DATA_ERROR.to_string()))),
        },
    };

    let schema = match dataset.describe(&table).await {
        Ok((schema, _)) => schema,
        Err(e) => {
            error!("Schema lookup failed for {}: {}", table, e);
            return Ok(Json(QueryResponse::failure(&question, "", e.to_string())));
        }
    };

    let resolved = state.resolver.resolve(&question, &schema).await;
    Ok(Json(execute_resolved(&dataset, &question, &table, resolved, true).await))
}

async fn execute_resolved(
    dataset: &DatasetView<'_>,
    question: &str,
    table: &str,
    resolved: ResolvedQuery,
    tag_source: bool,
) -> QueryResponse {
    info!("Executing {:?} SQL for '{}': {}", resolved.source, question, resolved.sql);

    let mut response = match dataset.execute(&resolved.sql).await {
        Ok(output) => {
            let total_results = output.rows.len();
            QueryResponse {
                success: true,
                query: question.to_string(),
                sql_generated: resolved.sql.clone(),
                confidence: resolved.confidence(),
                results: output.rows,
                total_results,
                metadata: QueryMetadata {
                    database: Some(table.to_string()),
                    execution_time: Some(format!("{}ms", output.execution_time_ms)),
                    execution_time_ms: Some(output.execution_time_ms),
                    rows_found: Some(total_results),
                    columns: Some(output.columns),
                    error_details: None,
                },
                error: None,
                source: None,
                fallback_reason: None,
            }
        }
        Err(e) => {
            error!("Query execution failed: {}", e);
            QueryResponse::failure(question, &resolved.sql, format!("Query execution failed: {}", e))
        }
    };

    if tag_source {
        response.source = Some(resolved.source);
        response.fallback_reason = resolved.fallback_reason;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::memory_pool;
    use crate::llm::testing::manager;
    use crate::llm::LlmManager;
    use crate::web::app;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    fn test_state(llm: LlmManager) -> Arc<AppState> {
        let data_dir = std::env::temp_dir().join(format!(
            "csv-nlq-web-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        let mut config = AppConfig::default();
        config.llm.providers.clear();
        Arc::new(AppState::new(config, memory_pool(), llm, data_dir))
    }

    fn upload_request(file_name: &str, contents: &str) -> Request<Body> {
        let boundary = "csvnlqboundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n--{b}--\r\n",
            b = boundary,
            name = file_name,
            contents = contents,
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    const IRIS: &str = "sepal_length,sepal_width,petal_length,petal_width,species\n\
        5.1,3.5,1.4,0.2,setosa\n\
        7.0,3.2,4.7,1.4,versicolor\n\
        6.3,3.3,6.0,2.5,virginica\n\
        5.8,2.7,5.1,1.9,virginica\n";

    #[tokio::test]
    async fn test_status_and_connections() {
        let state = test_state(manager(vec![]));
        let (status, body) = send(&state, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (_, body) = send(&state, Request::get("/api/connections").body(Body::empty()).unwrap()).await;
        assert_eq!(body["connections"][0]["name"], "Dynamic Database (No Data)");

        send(&state, upload_request("iris.csv", IRIS)).await;
        let (_, body) = send(&state, Request::get("/api/connections").body(Body::empty()).unwrap()).await;
        assert_eq!(body["connections"][0]["name"], "Dynamic Database (iris)");
        assert_eq!(body["connections"][0]["type"], "duckdb");
    }

    #[tokio::test]
    async fn test_schema_before_upload_waits() {
        let state = test_state(manager(vec![]));
        let (status, body) = send(&state, Request::get("/api/schema").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["table_name"], Value::Null);
        assert_eq!(body["waiting_for_upload"], true);
        assert_eq!(body["tables"], json!([]));
    }

    #[tokio::test]
    async fn test_upload_then_schema_round_trip() {
        let state = test_state(manager(vec![]));
        let (status, body) = send(&state, upload_request("My Data.csv", "a,b\n1,x\n2,y\n3,z\n")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["table_name"], "my_data");
        assert_eq!(body["rows_processed"], 3);
        assert_eq!(body["columns"], json!(["a", "b"]));

        let (_, body) = send(&state, Request::get("/api/schema").body(Body::empty()).unwrap()).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["table_name"], "my_data");
        let table = &body["tables"][0];
        assert_eq!(table["row_count"], 3);
        let names: Vec<&str> = table["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_csv() {
        let state = test_state(manager(vec![]));
        let (status, _) = send(&state, upload_request("notes.txt", "a,b\n1,2\n")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.active_table().await.is_none());
    }

    #[tokio::test]
    async fn test_upload_of_malformed_csv_is_a_server_error() {
        let state = test_state(manager(vec![]));
        let (status, _) = send(&state, upload_request("bad.csv", "a,b\n1,2\n3,4,5\n")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.active_table().await.is_none());
    }

    #[tokio::test]
    async fn test_query_without_dataset_fails_softly() {
        let state = test_state(manager(vec![]));
        let (status, body) = send(&state, json_request("/api/query", json!({"query": "how many"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["results"], json!([]));
        assert_eq!(body["total_results"], 0);
    }

    #[tokio::test]
    async fn test_rule_based_query_runs_against_upload() {
        let state = test_state(manager(vec![]));
        send(&state, upload_request("iris.csv", IRIS)).await;

        let (_, body) = send(&state, json_request("/api/query", json!({"query": "how many species"}))).await;
        assert_eq!(body["success"], true, "{body}");
        assert_eq!(body["sql_generated"], "SELECT species, COUNT(*) as count FROM iris GROUP BY species");
        assert_eq!(body["confidence"], 0.9);
        assert_eq!(body["total_results"], 3);
        assert_eq!(body["metadata"]["database"], "iris");
        assert!(body.get("source").is_none());

        let (_, body) = send(&state, json_request("/api/query", json!({"query": "virginica"}))).await;
        assert_eq!(body["total_results"], 2);
        assert!(body["results"].as_array().unwrap().iter().all(|r| r["species"] == "virginica"));
    }

    #[tokio::test]
    async fn test_ai_query_requires_query() {
        let state = test_state(manager(vec![]));
        let (status, _) = send(&state, json_request("/api/ai-query", json!({"table": "iris"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&state, json_request("/api/ai-query", json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ai_query_without_provider_uses_rules() {
        let state = test_state(LlmManager::from_generators(vec![]));
        send(&state, upload_request("iris.csv", IRIS)).await;

        let (status, body) = send(&state, json_request("/api/ai-query", json!({"query": "petal > 2"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true, "{body}");
        assert_eq!(body["source"], "rule-based");
        assert_eq!(body["fallback_reason"], "no provider configured");
        assert_eq!(body["sql_generated"], "SELECT * FROM iris WHERE petal_width > 2 LIMIT 50");
        assert_eq!(body["total_results"], 1);
    }

    #[tokio::test]
    async fn test_ai_query_uses_validated_model_sql() {
        let state = test_state(manager(vec![(
            "primary",
            Ok("SELECT species, AVG(petal_length) AS avg_len FROM iris GROUP BY species ORDER BY species;"),
        )]));
        send(&state, upload_request("iris.csv", IRIS)).await;

        let (_, body) = send(&state, json_request("/api/ai-query", json!({"query": "average petal length by species"}))).await;
        assert_eq!(body["success"], true, "{body}");
        assert_eq!(body["source"], "llm");
        assert!(body.get("fallback_reason").is_none());
        assert_eq!(body["confidence"], 0.95);
        assert_eq!(body["total_results"], 3);
        assert_eq!(body["results"][0]["species"], "setosa");
    }

    #[tokio::test]
    async fn test_ai_query_execution_error_is_reported() {
        let state = test_state(manager(vec![("primary", Ok("SELECT petal_length, no_such_column FROM iris"))]));
        send(&state, upload_request("iris.csv", IRIS)).await;

        let (status, body) = send(&state, json_request("/api/ai-query", json!({"query": "anything"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["source"], "llm");
        assert!(body["error"].as_str().unwrap().contains("no_such_column"));
        assert_eq!(body["results"], json!([]));
    }

    #[tokio::test]
    async fn test_ai_query_unknown_table_override() {
        let state = test_state(manager(vec![]));
        send(&state, upload_request("iris.csv", IRIS)).await;

        let (_, body) = send(&state, json_request("/api/ai-query", json!({"query": "count", "table": "missing"}))).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_upload_waits_for_open_dataset_view() {
        let state = test_state(manager(vec![]));
        send(&state, upload_request("iris.csv", IRIS)).await;

        let view = state.read_dataset().await;
        let writer = {
            let state = state.clone();
            tokio::spawn(async move {
                state
                    .replace_dataset("iris", b"name,age\nada,36\n")
                    .await
                    .map(|dataset| dataset.row_count)
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!writer.is_finished());
        let (schema, rows) = view.describe("iris").await.unwrap();
        assert_eq!(rows, 4);
        assert!(schema.column_names().contains(&"species".to_string()));
        let output = view.execute("SELECT species FROM iris").await.unwrap();
        assert_eq!(output.rows.len(), 4);
        drop(view);

        assert_eq!(writer.await.unwrap().unwrap(), 1);
        let (schema, _) = state.read_dataset().await.describe("iris").await.unwrap();
        assert_eq!(schema.column_names(), vec!["name", "age"]);
    }

    #[tokio::test]
    async fn test_last_upload_wins() {
        let state = test_state(manager(vec![]));
        send(&state, upload_request("iris.csv", IRIS)).await;
        send(&state, upload_request("people.csv", "name,age\nada,36\n")).await;

        assert_eq!(state.active_table().await.as_deref(), Some("people"));
        let (_, body) = send(&state, json_request("/api/query", json!({"query": "show everything"}))).await;
        assert_eq!(body["sql_generated"], "SELECT * FROM people LIMIT 100");
        assert_eq!(body["results"][0]["name"], "ada");
    }
}
