//! guild-proxy - Authenticating reverse proxy for the game data API
//!
//! Each configured route is a `ProxyOrchestrator`: it rewrites the inbound
//! path, attaches a bearer token from the shared `TokenCache` and the
//! namespace header, then streams the upstream response back unchanged.
//! A copy of the body goes to a detached side channel which parses
//! character profiles and writes stats and guild membership through a
//! `CharacterCacheUpdater`.

mod error;
mod hooks;
mod namespace;
mod orchestrator;
mod profile;
mod rewrite;
mod side_channel;
mod tee;
mod token;
mod updater;
mod upstream;

pub use error::{CredentialError, ProxyError, SideChannelError};
pub use hooks::{CorsHeaders, ProxyHook, ProxyRequestContext, UpstreamResponseMeta};
pub use namespace::{NamespaceResolver, DEFAULT_NAMESPACE, NAMESPACE_HEADER};
pub use orchestrator::{ProxyLimits, ProxyOrchestrator, RouteConfig};
pub use profile::{character_from_path, CharacterProfile};
pub use rewrite::{PathRewriter, RewriteRule};
pub use side_channel::{SideChannel, SideChannelOutcome};
pub use tee::{BodyReceiver, TeeStream};
pub use token::{
    CachedToken, ClientCredentialsExchange, Clock, CredentialExchange, IssuedToken, SystemClock,
    TokenCache,
};
pub use updater::{CharacterCacheUpdater, ProfileUpdateOutcome};
pub use upstream::{
    client_response_headers, forwardable_request_headers, UpstreamClient, UpstreamOptions,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT,
};
