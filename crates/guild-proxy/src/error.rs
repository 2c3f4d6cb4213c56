//! Error types for proxy operations

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors from obtaining a bearer token
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Client id or secret missing from configuration
    #[error("Upstream API credentials not configured")]
    NotConfigured,

    /// Identity provider answered with a non-success status
    #[error("Credential exchange rejected with status {status}")]
    Rejected { status: u16 },

    /// Identity provider could not be reached
    #[error("Credential exchange request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Identity provider answered with an unusable body
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Errors that end a proxied request before any upstream bytes reach the caller
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Required configuration (credentials) is absent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Identity provider refused or failed the exchange
    #[error("Credential exchange failed: {0}")]
    CredentialExchange(String),

    /// Connection-level failure talking to the upstream API
    #[error("Upstream request failed: {0}")]
    UpstreamNetwork(#[from] reqwest::Error),

    /// Rewritten path does not form a valid upstream URL
    #[error("Invalid upstream target: {0}")]
    InvalidTarget(String),

    /// Inbound request body exceeds the configured limit
    #[error("Request body too large")]
    BodyTooLarge,
}

impl From<CredentialError> for ProxyError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotConfigured => ProxyError::Configuration(err.to_string()),
            other => ProxyError::CredentialExchange(other.to_string()),
        }
    }
}

/// Errors on the side channel. Logged only, never surfaced to the caller.
#[derive(Error, Debug)]
pub enum SideChannelError {
    /// Accumulated body is not a valid character profile
    #[error("Failed to parse character profile: {0}")]
    Parse(#[from] serde_json::Error),

    /// Body is valid JSON but not an object
    #[error("Character profile is not a JSON object")]
    NotAnObject,

    /// One stat field is present but not a non-negative integer
    #[error("Invalid {field} in character profile: {source}")]
    InvalidStat {
        field: &'static str,
        source: serde_json::Error,
    },

    /// The upstream body did not complete (client went away or stream failed)
    #[error("Response body incomplete")]
    Incomplete,

    /// The upstream body exceeded the inspection limit
    #[error("Response body exceeds inspection limit of {0} bytes")]
    TooLarge(usize),

    /// Accumulation did not finish in time
    #[error("Timed out waiting for response body")]
    Timeout,
}

/// Proxy-level error body: `{ "error": string }`
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ProxyError::Configuration(_) | ProxyError::CredentialExchange(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to authenticate with upstream API",
            ),
            ProxyError::UpstreamNetwork(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Proxy request failed")
            }
            ProxyError::InvalidTarget(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Proxy middleware failed")
            }
            ProxyError::BodyTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Proxy error");
        } else {
            tracing::debug!(error = %self, "Proxy client error");
        }

        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let err: ProxyError = CredentialError::NotConfigured.into();
        assert!(matches!(err, ProxyError::Configuration(_)));

        let err: ProxyError = CredentialError::Rejected { status: 401 }.into();
        assert!(matches!(err, ProxyError::CredentialExchange(_)));
    }

    #[test]
    fn test_proxy_errors_are_server_errors() {
        let response = ProxyError::Configuration("x".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ProxyError::BodyTooLarge.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
