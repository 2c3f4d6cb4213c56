//! UpstreamClient - outbound HTTP(S) to one upstream base URL

use std::time::Duration;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::Method;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::ProxyError;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Inbound headers minus hop-by-hop headers and framing.
///
/// `content-length` is recomputed by the HTTP client from the forwarded body.
pub fn forwardable_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Upstream response headers to copy to the caller.
///
/// The body is re-streamed, so the original framing headers are dropped.
/// A JSON content type is assumed when upstream sent none.
pub fn client_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len() + 1);
    for (name, value) in upstream {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    headers
}

#[derive(Debug, Clone, Copy)]
pub struct UpstreamOptions {
    /// Validate TLS certificates
    pub secure: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for UpstreamOptions {
    fn default() -> Self {
        Self {
            secure: true,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base: Url,
}

impl UpstreamClient {
    pub fn new(base_url: &str, options: UpstreamOptions) -> Result<Self, ProxyError> {
        let base = Url::parse(base_url)
            .map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidTarget(format!(
                "unsupported scheme: {}",
                base.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .danger_accept_invalid_certs(!options.secure)
            // 3xx is relayed to the caller; following it would bypass `target_url`
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `Host` value for the upstream (`host[:port]`)
    pub fn host_header(&self) -> Option<HeaderValue> {
        let host = self.base.host_str()?;
        let value = match self.base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        HeaderValue::from_str(&value).ok()
    }

    /// Join a rewritten path (and query) onto the base URL.
    ///
    /// The result must stay on the configured origin.
    pub fn target_url(&self, path_and_query: &str) -> Result<Url, ProxyError> {
        let url = self
            .base
            .join(path_and_query)
            .map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", path_and_query, e)))?;
        if url.origin() != self.base.origin() {
            return Err(ProxyError::InvalidTarget(format!(
                "{} leaves upstream origin",
                path_and_query
            )));
        }
        Ok(url)
    }

    /// Send one request; the response body is left unread.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        debug!(%method, %url, "Forwarding request upstream");

        let mut request = self.http.request(method, url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> UpstreamClient {
        UpstreamClient::new(base, UpstreamOptions::default()).unwrap()
    }

    #[test]
    fn test_target_url_joins_rewritten_path() {
        let upstream = client("https://us.api.blizzard.com");
        let url = upstream
            .target_url("/profile/wow/character/arugal/foo?locale=en_US")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://us.api.blizzard.com/profile/wow/character/arugal/foo?locale=en_US"
        );
        assert_eq!(
            upstream.target_url("").unwrap().as_str(),
            "https://us.api.blizzard.com/"
        );
    }

    #[test]
    fn test_target_url_rejects_other_origins() {
        let upstream = client("https://wow.zamimg.com");
        assert!(matches!(
            upstream.target_url("//evil.example/x"),
            Err(ProxyError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_invalid_base_is_rejected() {
        assert!(UpstreamClient::new("not a url", UpstreamOptions::default()).is_err());
        assert!(UpstreamClient::new("ftp://example.com", UpstreamOptions::default()).is_err());
    }

    #[test]
    fn test_host_header_includes_port() {
        assert_eq!(
            client("http://127.0.0.1:8080").host_header().unwrap(),
            "127.0.0.1:8080"
        );
        assert_eq!(
            client("https://us.api.blizzard.com").host_header().unwrap(),
            "us.api.blizzard.com"
        );
    }

    #[test]
    fn test_request_headers_drop_hop_by_hop_and_length() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(header::USER_AGENT, HeaderValue::from_static("test"));

        let outbound = forwardable_request_headers(&inbound);
        assert!(!outbound.contains_key(header::CONNECTION));
        assert!(!outbound.contains_key(header::CONTENT_LENGTH));
        assert_eq!(outbound[header::USER_AGENT], "test");
    }

    #[test]
    fn test_response_headers_strip_framing_and_default_content_type() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert("x-trace", HeaderValue::from_static("abc"));

        let headers = client_response_headers(&upstream);
        assert!(!headers.contains_key(header::CONTENT_LENGTH));
        assert!(!headers.contains_key(header::TRANSFER_ENCODING));
        assert_eq!(headers["x-trace"], "abc");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");

        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        assert_eq!(client_response_headers(&upstream)[header::CONTENT_TYPE], "image/png");
    }
}
