pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use rest::{
    complete_lesson_handler, generate_lesson_handler, get_document_handler, get_lesson_handler,
    health_handler, process_document_handler, storage_handler, upload_document_handler,
};
use state::AppState;

/// Builds the API routes over a shared state. CORS and the Swagger UI are
/// layered on by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/documents", post(upload_document_handler))
        .route("/documents/{document_id}", get(get_document_handler))
        .route("/process/{document_id}", post(process_document_handler))
        .route("/lessons/{lesson_id}", get(get_lesson_handler))
        .route("/lessons/{lesson_id}/generate", post(generate_lesson_handler))
        .route("/lessons/{lesson_id}/complete", post(complete_lesson_handler))
        .route("/storage/{*path}", get(storage_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
