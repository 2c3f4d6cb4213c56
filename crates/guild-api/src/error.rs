//! API error types and conversions

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guild_core::StoreError;
use serde::Serialize;
use thiserror::Error;

/// API error type that converts to HTTP responses
#[derive(Error, Debug)]
pub enum ApiError {
    /// 404 Not Found
    #[error("{0}")]
    NotFound(String),
    /// 500 Internal Server Error reported to the caller as `message`
    #[error("{message}")]
    Store { message: String, source: StoreError },
}

/// Error body shared with the proxy routes
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::debug!(%msg, "API client error");
                (StatusCode::NOT_FOUND, msg)
            }
            ApiError::Store { message, source } => {
                tracing::error!(error = %source, %message, "Character store query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl ApiError {
    /// Persistence failure reported to the caller as `message`
    pub fn store(source: StoreError, message: &str) -> Self {
        ApiError::Store {
            message: message.to_string(),
            source,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::store(err, "Failed to fetch top characters")
    }
}

#[cfg(test)]
mod tests {
    use axum::body;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_store_error_hides_cause_from_caller() {
        let err = ApiError::store(
            StoreError::Database("connection reset".to_string()),
            "Failed to fetch top characters by equipped item level",
        );
        assert!(matches!(
            &err,
            ApiError::Store {
                source: StoreError::Database(_),
                ..
            }
        ));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({
                "error": "Failed to fetch top characters by equipped item level"
            })
        );
    }

    #[tokio::test]
    async fn test_store_error_conversion_uses_generic_message() {
        let err: ApiError = StoreError::Database("boom".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Failed to fetch top characters");
    }
}
