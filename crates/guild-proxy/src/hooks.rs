//! Per-route request/response hooks and the context they observe

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use url::Url;

/// Everything known about one inbound request once it has been resolved
/// against its route. Lives for a single request/response cycle.
#[derive(Debug, Clone)]
pub struct ProxyRequestContext {
    pub route: String,
    pub method: Method,
    /// Inbound path and query, before rewriting
    pub inbound: String,
    /// Inbound headers as received
    pub headers: HeaderMap,
    pub body: Bytes,
    pub target: Url,
    pub namespace: String,
    pub authenticated: bool,
}

/// Upstream response as seen by the side channel
#[derive(Debug, Clone)]
pub struct UpstreamResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub target: Url,
    pub inbound: String,
    /// Length of the accumulated body, if it completed within limits
    pub body_len: Option<usize>,
}

/// Route-level extension points.
///
/// All methods default to no-ops so hooks only implement what they need.
pub trait ProxyHook: Send + Sync {
    /// Edit outbound headers after the proxy has set its own
    fn on_proxy_request(&self, _ctx: &ProxyRequestContext, _outbound: &mut HeaderMap) {}

    /// Edit client-facing headers before the body starts streaming
    fn on_proxy_response_headers(&self, _status: StatusCode, _headers: &mut HeaderMap) {}

    /// Inspect the finished response (runs on the side channel)
    fn on_proxy_response(&self, _meta: &UpstreamResponseMeta) {}
}

/// Adds CORS headers to responses from asset hosts that omit them
#[derive(Debug, Clone)]
pub struct CorsHeaders {
    allow_origin: HeaderValue,
}

impl CorsHeaders {
    pub fn new(allow_origin: HeaderValue) -> Self {
        Self { allow_origin }
    }
}

impl ProxyHook for CorsHeaders {
    fn on_proxy_response_headers(&self, _status: StatusCode, headers: &mut HeaderMap) {
        headers.insert(
            axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allow_origin.clone(),
        );
        headers.insert(
            axum::http::header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Origin, X-Requested-With, Content-Type, Accept"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_headers_overwrite_upstream_values() {
        let hook = CorsHeaders::new(HeaderValue::from_static("http://localhost:3000"));
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );

        hook.on_proxy_response_headers(StatusCode::OK, &mut headers);

        assert_eq!(headers["access-control-allow-origin"], "http://localhost:3000");
        assert_eq!(headers["access-control-allow-methods"], "GET, OPTIONS");
        assert!(headers.contains_key("access-control-allow-headers"));
    }
}
