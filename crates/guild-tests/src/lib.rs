//! End-to-end test harness for the guild site backend
//!
//! Runs the real router from `guildd` over loopback TCP against two mocks:
//! - `MockIdentity` - client-credentials token endpoint
//! - `MockUpstream` - game-data API / asset host returning canned responses
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p guild-tests
//! ```
//!
//! # Test Structure
//!
//! - `proxy_e2e_test.rs` - proxy, token lifecycle and cache side channel
//! - `api_e2e_test.rs` - leaderboards and service endpoints

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use guild_core::InMemoryCharacterStore;
use guildd::config::{Config, RouteEntry};
use parking_lot::Mutex;

/// Serve `router` on an ephemeral loopback port
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A loopback address nothing is listening on
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Poll `check` until it returns true or two seconds pass
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// One request as received by a mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

async fn record(request: Request) -> RecordedRequest {
    let (parts, body) = request.into_parts();
    RecordedRequest {
        method: parts.method,
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers: parts.headers,
        body: body::to_bytes(body, usize::MAX).await.unwrap_or_default(),
    }
}

// =============================================================================
// Mock identity provider
// =============================================================================

#[derive(Clone)]
struct IdentityState {
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    status: StatusCode,
    expires_in: i64,
}

/// Token endpoint issuing `token-<n>` on the n-th successful exchange
pub struct MockIdentity {
    pub addr: SocketAddr,
    state: IdentityState,
}

impl MockIdentity {
    pub async fn start() -> Self {
        Self::start_with(StatusCode::OK, 3600).await
    }

    /// Token endpoint that always answers with `status`
    pub async fn rejecting(status: StatusCode) -> Self {
        Self::start_with(status, 3600).await
    }

    pub async fn start_with(status: StatusCode, expires_in: i64) -> Self {
        let state = IdentityState {
            calls: Arc::default(),
            requests: Arc::default(),
            status,
            expires_in,
        };
        let router = Router::new()
            .route("/token", post(issue_token))
            .with_state(state.clone());
        let addr = serve(router).await;
        Self { addr, state }
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }
}

async fn issue_token(State(state): State<IdentityState>, request: Request) -> Response {
    let recorded = record(request).await;
    state.requests.lock().push(recorded);
    let n = state.calls.fetch_add(1, Ordering::SeqCst) + 1;

    if !state.status.is_success() {
        return (state.status, Json(serde_json::json!({ "error": "invalid_client" })))
            .into_response();
    }
    Json(serde_json::json!({
        "access_token": format!("token-{}", n),
        "token_type": "bearer",
        "expires_in": state.expires_in,
    }))
    .into_response()
}

// =============================================================================
// Mock upstream
// =============================================================================

/// A canned upstream response, sent as the given chunks
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub headers: HeaderMap,
    pub chunks: Vec<Bytes>,
}

impl MockResponse {
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        Self::raw(status, serde_json::to_vec(body).unwrap())
    }

    /// Body sent verbatim with a JSON content type, valid or not
    pub fn raw(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: Some("application/json; charset=utf-8"),
            headers: HeaderMap::new(),
            chunks: vec![body.into()],
        }
    }

    pub fn chunked(status: StatusCode, chunks: &[&'static str]) -> Self {
        Self {
            status,
            content_type: Some("application/json"),
            headers: HeaderMap::new(),
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
        }
    }

    /// Empty-bodied redirect to `location`
    pub fn redirect(status: StatusCode, location: &str) -> Self {
        Self {
            status,
            content_type: None,
            headers: HeaderMap::new(),
            chunks: Vec::new(),
        }
        .with_header(header::LOCATION, location)
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        self.headers.insert(name, HeaderValue::from_str(value).unwrap());
        self
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    fn into_http(self) -> Response {
        let chunks = self.chunks.into_iter().map(Ok::<_, Infallible>);
        let mut response = Response::new(Body::from_stream(futures::stream::iter(chunks)));
        *response.status_mut() = self.status;
        response.headers_mut().extend(self.headers);
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response
    }
}

#[derive(Clone, Default)]
struct UpstreamState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Path (no query) -> responses; the last one repeats
    responses: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
}

/// Upstream API answering canned responses by path
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: UpstreamState,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = UpstreamState::default();
        let router = Router::new()
            .fallback(upstream_handler)
            .with_state(state.clone());
        let addr = serve(router).await;
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer `path` with `response` from now on
    pub fn respond(&self, path: &str, response: MockResponse) {
        self.respond_sequence(path, vec![response]);
    }

    /// Answer `path` with each response in turn, repeating the last
    pub fn respond_sequence(&self, path: &str, responses: Vec<MockResponse>) {
        self.state
            .responses
            .lock()
            .insert(path.to_string(), responses.into());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().last().cloned()
    }
}

async fn upstream_handler(State(state): State<UpstreamState>, request: Request) -> Response {
    let recorded = record(request).await;
    let path = recorded
        .path_and_query
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string();
    state.requests.lock().push(recorded);

    let canned = {
        let mut responses = state.responses.lock();
        responses.get_mut(&path).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        })
    };

    match canned {
        Some(response) => response.into_http(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "code": 404,
                "type": "BLZWEBAPI00000404",
                "detail": "Not Found",
            })),
        )
            .into_response(),
    }
}

/// Character profile payload as the game-data API returns it
pub fn profile_body(
    guild: Option<&str>,
    achievement_points: u32,
    item_level: u32,
) -> serde_json::Value {
    let mut profile = serde_json::json!({
        "id": 1234,
        "name": "Foo",
        "achievement_points": achievement_points,
        "equipped_item_level": item_level,
        "realm": { "slug": "arugal" },
    });
    if let Some(guild) = guild {
        profile["guild"] = serde_json::json!({ "name": guild, "id": 77 });
    }
    profile
}

// =============================================================================
// Guild server under test
// =============================================================================

/// The guild backend wired to the mocks, with an inspectable store
pub struct GuildServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryCharacterStore>,
    pub client: reqwest::Client,
}

impl GuildServer {
    /// Config routing both stock mounts to `upstream`
    pub fn config(identity: &MockIdentity, upstream: &MockUpstream) -> Config {
        let mut config = Config::default();
        config.credentials.token_url = identity.token_url();
        config.credentials.client_id = Some("client-id".to_string());
        config.credentials.client_secret = Some("client-secret".to_string());
        config.timeouts.side_channel_secs = 5;
        config.routes = vec![
            RouteEntry {
                name: "zamimg".to_string(),
                target: upstream.url(),
                change_origin: true,
                secure: true,
                requires_auth: false,
                cors_headers: true,
                path_rewrite: None,
            },
            RouteEntry {
                name: "wow".to_string(),
                target: upstream.url(),
                change_origin: true,
                secure: true,
                requires_auth: true,
                cors_headers: false,
                path_rewrite: None,
            },
        ];
        config
    }

    pub async fn start(identity: &MockIdentity, upstream: &MockUpstream) -> Self {
        Self::start_with(Self::config(identity, upstream)).await
    }

    pub async fn start_with(config: Config) -> Self {
        let store = Arc::new(InMemoryCharacterStore::new());
        let router = guildd::build_router(&config, store.clone()).unwrap();
        let addr = serve(router).await;
        Self {
            addr,
            store,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }
}
