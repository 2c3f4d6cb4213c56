//! Wiring: configuration in, router out

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use guild_api::{create_router, AppState};
use guild_core::{CharacterStore, InMemoryCharacterStore};
use guild_db::PgCharacterStore;
use guild_proxy::{
    CharacterCacheUpdater, ClientCredentialsExchange, CorsHeaders, ProxyOrchestrator, TokenCache,
};
use url::Url;

use crate::config::Config;

/// Open the configured character store.
///
/// Connects and migrates when a database URL is set, otherwise falls back
/// to an in-memory cache that lives as long as the process.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn CharacterStore>> {
    match &config.database.url {
        Some(url) => {
            let pool = guild_db::create_pool(url, config.database.max_connections)
                .await
                .context("Failed to connect to database")?;
            guild_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            guild_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            tracing::info!("Using PostgreSQL character store");
            Ok(Arc::new(PgCharacterStore::new(pool)))
        }
        None => {
            tracing::warn!("No database configured, character cache is in-memory only");
            Ok(Arc::new(InMemoryCharacterStore::new()))
        }
    }
}

/// Shared token cache for all authenticated routes
pub fn token_cache(config: &Config) -> anyhow::Result<Arc<TokenCache>> {
    let token_url = Url::parse(&config.credentials.token_url)
        .with_context(|| format!("invalid token_url '{}'", config.credentials.token_url))?;
    let exchange = ClientCredentialsExchange::new(
        token_url,
        config.credentials.client_id.clone(),
        config.credentials.client_secret.clone(),
        std::time::Duration::from_secs(config.timeouts.token_secs),
    )?;

    if config.credentials.client_id.is_none() || config.credentials.client_secret.is_none() {
        tracing::warn!("Upstream API credentials not configured; authenticated routes will fail");
    }
    Ok(Arc::new(TokenCache::new(Arc::new(exchange))))
}

/// Build one orchestrator per configured route
pub fn build_proxies(
    config: &Config,
    store: Arc<dyn CharacterStore>,
    tokens: Arc<TokenCache>,
) -> anyhow::Result<Vec<Arc<ProxyOrchestrator>>> {
    let namespaces = Arc::new(config.namespaces.resolver());
    let updater = Arc::new(CharacterCacheUpdater::new(store, config.guild.name.clone()));
    let cors_origin = HeaderValue::from_str(&config.cors_origin())
        .with_context(|| format!("invalid frontend origin '{}'", config.cors_origin()))?;

    let mut proxies = Vec::with_capacity(config.routes.len());
    for entry in &config.routes {
        let route = entry.to_route_config()?;
        let mut proxy = ProxyOrchestrator::new(
            route,
            config.upstream_options(),
            namespaces.clone(),
            config.limits(),
        )
        .with_context(|| format!("route '{}'", entry.name))?;

        // Character profiles only come from the authenticated game-data API
        if entry.requires_auth {
            proxy = proxy
                .with_token_cache(tokens.clone())
                .with_cache_updater(updater.clone());
        }
        if entry.cors_headers {
            proxy = proxy.with_hook(Arc::new(CorsHeaders::new(cors_origin.clone())));
        }

        tracing::info!(
            route = %entry.name,
            target = %entry.target,
            auth = entry.requires_auth,
            "Configured proxy route"
        );
        proxies.push(Arc::new(proxy));
    }
    Ok(proxies)
}

/// Full application router for `config` over `store`
pub fn build_router(config: &Config, store: Arc<dyn CharacterStore>) -> anyhow::Result<Router> {
    config.validate()?;
    let tokens = token_cache(config)?;
    let proxies = build_proxies(config, store.clone(), tokens)?;
    let origins = config.allowed_origins()?;
    Ok(create_router(AppState::with_proxies(store, proxies), &origins))
}
