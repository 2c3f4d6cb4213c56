//! guild-api - HTTP API layer for the guild site backend
//!
//! Mounts every configured `ProxyOrchestrator` under `/api/<name>`, serves
//! the leaderboard reads under `/api/guild` and the service endpoints.
//!
//! # Usage
//!
//! ```ignore
//! use guild_api::{create_router, AppState};
//! use guild_core::InMemoryCharacterStore;
//!
//! let state = AppState::with_proxies(Arc::new(InMemoryCharacterStore::new()), proxies);
//! let router = create_router(state, &allowed_origins);
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{any, get};
use axum::Router;
use guild_proxy::ProxyOrchestrator;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the guild API router with the given application state.
///
/// `allowed_origins` are the browser origins admitted by the CORS layer.
pub fn create_router(state: AppState, allowed_origins: &[HeaderValue]) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins.iter().cloned()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true);

    let mut router = Router::new()
        // Health check
        .route("/health", get(handlers::service::health))
        // Leaderboards
        .route(
            "/api/guild/top-characters/achievement-points",
            get(handlers::leaderboard::top_by_achievement_points),
        )
        .route(
            "/api/guild/top-characters/equipped-item-level",
            get(handlers::leaderboard::top_by_equipped_item_level),
        );

    // Proxy mounts, one pair per route: the bare prefix and everything below it
    for proxy in state.proxies() {
        router = mount_proxy(router, proxy.clone());
    }

    router
        .fallback(handlers::service::not_found)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn mount_proxy(router: Router<AppState>, proxy: Arc<ProxyOrchestrator>) -> Router<AppState> {
    let mount = proxy.mount_path();
    tracing::info!(
        route = proxy.name(),
        target = %proxy.upstream().base_url(),
        "Mounting proxy route"
    );

    let handler = move |request: Request| async move { proxy.handle(request).await };
    router
        .route(&mount, any(handler.clone()))
        .route(&format!("{}/{{*rest}}", mount), any(handler))
}
