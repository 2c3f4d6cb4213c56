//! TOML configuration for guildd
//!
//! Every section has defaults, so an absent file (or an empty one) gives the
//! stock deployment: the asset host and the game-data API mounted under
//! `/api`, an in-memory character cache, and credentials taken from the
//! environment.

use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use guild_proxy::{
    NamespaceResolver, ProxyLimits, RewriteRule, RouteConfig, UpstreamOptions, DEFAULT_NAMESPACE,
};
use serde::Deserialize;

/// Mount reserved for the leaderboard endpoints
const RESERVED_ROUTE: &str = "guild";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Browser origins admitted by the CORS layer
    pub allowed_origins: Vec<String>,
    /// Frontend origin; also used for CORS headers added to asset responses
    pub frontend_url: Option<String>,
    /// Largest inbound request body forwarded upstream
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            frontend_url: None,
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    /// Guild whose members are shown on the leaderboards
    pub name: String,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            name: "Low Calibre".to_string(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_url: "https://oauth.battle.net/token".to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; the in-memory store is used when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub upstream_secs: u64,
    pub token_secs: u64,
    pub side_channel_secs: u64,
    /// Largest upstream body retained for profile inspection
    pub side_channel_max_bytes: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            upstream_secs: 30,
            token_secs: 10,
            side_channel_secs: 30,
            side_channel_max_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamespacePrefix {
    pub prefix: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub default: String,
    /// Checked in order; the first matching prefix wins
    pub prefix: Vec<NamespacePrefix>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        let prefix = [
            ("/data/wow/item-appearance", "static-us"),
            ("/data/wow/item", "static-us"),
            ("/data/wow/achievement", "static-classic-us"),
            ("/data/wow/media", "static-classic-us"),
        ]
        .into_iter()
        .map(|(prefix, namespace)| NamespacePrefix {
            prefix: prefix.to_string(),
            namespace: namespace.to_string(),
        })
        .collect();

        Self {
            default: DEFAULT_NAMESPACE.to_string(),
            prefix,
        }
    }
}

impl NamespaceConfig {
    pub fn resolver(&self) -> NamespaceResolver {
        self.prefix.iter().fold(
            NamespaceResolver::new(self.default.clone()),
            |resolver, p| resolver.with_prefix(p.prefix.clone(), p.namespace.clone()),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewriteEntry {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

fn default_true() -> bool {
    true
}

/// One `[[route]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    pub name: String,
    pub target: String,
    #[serde(default = "default_true")]
    pub change_origin: bool,
    #[serde(default = "default_true")]
    pub secure: bool,
    #[serde(default)]
    pub requires_auth: bool,
    /// Decorate responses with CORS headers for the frontend origin
    #[serde(default)]
    pub cors_headers: bool,
    /// Rewrite rules; when absent the `/api/<name>` prefix is stripped
    #[serde(default)]
    pub path_rewrite: Option<Vec<RewriteEntry>>,
}

impl RouteEntry {
    pub fn to_route_config(&self) -> anyhow::Result<RouteConfig> {
        let mut route = RouteConfig::mounted(&self.name, &self.target)
            .with_context(|| format!("route '{}': invalid name", self.name))?;
        route.change_origin = self.change_origin;
        route.secure = self.secure;
        route.requires_auth = self.requires_auth;

        if let Some(rules) = &self.path_rewrite {
            route.path_rewrite = rules
                .iter()
                .map(|r| {
                    RewriteRule::new(&r.pattern, &r.replacement).with_context(|| {
                        format!("route '{}': invalid rewrite pattern '{}'", self.name, r.pattern)
                    })
                })
                .collect::<anyhow::Result<_>>()?;
        }
        Ok(route)
    }
}

fn default_routes() -> Vec<RouteEntry> {
    vec![
        RouteEntry {
            name: "zamimg".to_string(),
            target: "https://wow.zamimg.com".to_string(),
            change_origin: true,
            secure: true,
            requires_auth: false,
            cors_headers: true,
            path_rewrite: None,
        },
        RouteEntry {
            name: "wow".to_string(),
            target: "https://us.api.blizzard.com".to_string(),
            change_origin: true,
            secure: true,
            requires_auth: true,
            cors_headers: false,
            path_rewrite: None,
        },
    ]
}

/// Top-level guildd configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub guild: GuildConfig,
    pub credentials: CredentialsConfig,
    pub database: DatabaseConfig,
    pub timeouts: TimeoutConfig,
    pub namespaces: NamespaceConfig,
    #[serde(rename = "route")]
    pub routes: Vec<RouteEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            guild: GuildConfig::default(),
            credentials: CredentialsConfig::default(),
            database: DatabaseConfig::default(),
            timeouts: TimeoutConfig::default(),
            namespaces: NamespaceConfig::default(),
            routes: default_routes(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file '{}'", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply environment-style overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", port))?;
        }
        if let Some(url) = var("FRONTEND_URL") {
            self.server.frontend_url = Some(url);
        }
        if let Some(id) = var("BLIZZARD_CLIENT_ID") {
            self.credentials.client_id = Some(id);
        }
        if let Some(secret) = var("BLIZZARD_CLIENT_SECRET") {
            self.credentials.client_secret = Some(secret);
        }
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(name) = var("GUILD_NAME") {
            self.guild.name = name;
        }
        Ok(())
    }

    /// Reject configurations that cannot be served
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            if route.name.is_empty() || route.name.contains('/') {
                anyhow::bail!("route name '{}' must be a single path segment", route.name);
            }
            if route.name == RESERVED_ROUTE {
                anyhow::bail!("route name '{}' is reserved", route.name);
            }
            if !seen.insert(route.name.as_str()) {
                anyhow::bail!("duplicate route name '{}'", route.name);
            }
            route.to_route_config()?;
        }
        Ok(())
    }

    /// Origins for the CORS layer: configured list plus the frontend URL
    pub fn allowed_origins(&self) -> anyhow::Result<Vec<HeaderValue>> {
        let mut origins = self.server.allowed_origins.clone();
        if let Some(frontend) = &self.server.frontend_url {
            if !origins.contains(frontend) {
                origins.push(frontend.clone());
            }
        }
        origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("invalid allowed origin '{}'", o))
            })
            .collect()
    }

    /// Origin written into CORS headers on decorated proxy responses
    pub fn cors_origin(&self) -> String {
        self.server
            .frontend_url
            .clone()
            .or_else(|| self.server.allowed_origins.first().cloned())
            .unwrap_or_else(|| "http://localhost:3000".to_string())
    }

    pub fn upstream_options(&self) -> UpstreamOptions {
        UpstreamOptions {
            secure: true,
            timeout: Duration::from_secs(self.timeouts.upstream_secs),
            connect_timeout: Duration::from_secs(self.timeouts.connect_secs),
        }
    }

    pub fn limits(&self) -> ProxyLimits {
        ProxyLimits {
            max_body_bytes: self.server.max_body_bytes,
            side_channel_max_bytes: self.timeouts.side_channel_max_bytes,
            side_channel_timeout: Duration::from_secs(self.timeouts.side_channel_secs),
        }
    }
}
