use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// Service status
pub fn status_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(handlers::api::root))
}

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest(
            "/api",
            Router::new()
                // Dataset
                .route("/connections", get(handlers::api::list_connections))
                .route("/schema", get(handlers::api::get_schema))
                .route("/upload", post(handlers::api::upload_file))

                // Query endpoints
                .route("/query", post(handlers::api::query))
                .route("/ai-query", post(handlers::api::ai_query))
        )
}
