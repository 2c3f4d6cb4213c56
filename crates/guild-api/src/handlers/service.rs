//! Health check and fallback handlers

use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Any route nothing else matched
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}
