//! Application state for the guild API

use std::sync::Arc;

use guild_core::CharacterStore;
use guild_proxy::ProxyOrchestrator;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Character cache read by the leaderboard endpoints
    store: Arc<dyn CharacterStore>,
    /// One orchestrator per `/api/<name>` mount
    proxies: Arc<Vec<Arc<ProxyOrchestrator>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn CharacterStore>) -> Self {
        Self {
            store,
            proxies: Arc::new(Vec::new()),
        }
    }

    /// Create AppState with the configured proxy routes
    pub fn with_proxies(
        store: Arc<dyn CharacterStore>,
        proxies: Vec<Arc<ProxyOrchestrator>>,
    ) -> Self {
        Self {
            store,
            proxies: Arc::new(proxies),
        }
    }

    pub fn store(&self) -> &Arc<dyn CharacterStore> {
        &self.store
    }

    pub fn proxies(&self) -> &[Arc<ProxyOrchestrator>] {
        &self.proxies
    }
}
