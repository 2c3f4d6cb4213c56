//! ProxyOrchestrator - one configured `/api/<name>` route
//!
//! Per request: rewrite path, resolve target, attach token and namespace,
//! forward, then stream the upstream response to the caller while a
//! detached side-channel task inspects a copy of the body.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info};

use crate::error::ProxyError;
use crate::hooks::{ProxyHook, ProxyRequestContext, UpstreamResponseMeta};
use crate::namespace::{NamespaceResolver, NAMESPACE_HEADER};
use crate::profile::character_from_path;
use crate::rewrite::{PathRewriter, RewriteRule};
use crate::side_channel::SideChannel;
use crate::tee::TeeStream;
use crate::token::TokenCache;
use crate::updater::CharacterCacheUpdater;
use crate::upstream::{
    client_response_headers, forwardable_request_headers, UpstreamClient, UpstreamOptions,
};

/// Static description of one proxied route
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Mount name; the route serves `/api/<name>`
    pub name: String,
    /// Upstream base URL
    pub target: String,
    /// Overwrite `Host` with the upstream host
    pub change_origin: bool,
    /// Validate upstream TLS certificates
    pub secure: bool,
    /// Attach a bearer token from the shared `TokenCache`
    pub requires_auth: bool,
    pub path_rewrite: Vec<RewriteRule>,
}

impl RouteConfig {
    /// Route mounted at `/api/<name>` whose prefix is stripped before forwarding
    pub fn mounted(name: &str, target: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            target: target.to_string(),
            change_origin: true,
            secure: true,
            requires_auth: false,
            path_rewrite: vec![RewriteRule::new(
                &format!("^/api/{}", regex::escape(name)),
                "",
            )?],
        })
    }

    pub fn mount_path(&self) -> String {
        format!("/api/{}", self.name)
    }
}

/// Size and time bounds shared by all routes
#[derive(Debug, Clone, Copy)]
pub struct ProxyLimits {
    /// Largest inbound body accepted for forwarding
    pub max_body_bytes: usize,
    /// Largest upstream body kept for side-channel inspection
    pub side_channel_max_bytes: usize,
    /// How long the side channel waits for the body to finish
    pub side_channel_timeout: Duration,
}

impl Default for ProxyLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            side_channel_max_bytes: 8 * 1024 * 1024,
            side_channel_timeout: Duration::from_secs(30),
        }
    }
}

/// Debug view of a header map with credentials masked
struct Redacted<'a>(&'a HeaderMap);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.0 {
            if name == header::AUTHORIZATION || name == header::COOKIE {
                map.entry(&name.as_str(), &"<redacted>");
            } else {
                map.entry(&name.as_str(), &value);
            }
        }
        map.finish()
    }
}

pub struct ProxyOrchestrator {
    name: String,
    change_origin: bool,
    requires_auth: bool,
    rewriter: PathRewriter,
    upstream: UpstreamClient,
    namespaces: Arc<NamespaceResolver>,
    tokens: Option<Arc<TokenCache>>,
    updater: Option<Arc<CharacterCacheUpdater>>,
    hooks: Vec<Arc<dyn ProxyHook>>,
    limits: ProxyLimits,
}

impl ProxyOrchestrator {
    pub fn new(
        route: RouteConfig,
        options: UpstreamOptions,
        namespaces: Arc<NamespaceResolver>,
        limits: ProxyLimits,
    ) -> Result<Self, ProxyError> {
        let upstream = UpstreamClient::new(
            &route.target,
            UpstreamOptions {
                secure: route.secure,
                ..options
            },
        )?;

        Ok(Self {
            name: route.name,
            change_origin: route.change_origin,
            requires_auth: route.requires_auth,
            rewriter: PathRewriter::new(route.path_rewrite),
            upstream,
            namespaces,
            tokens: None,
            updater: None,
            hooks: Vec::new(),
            limits,
        })
    }

    pub fn with_token_cache(mut self, tokens: Arc<TokenCache>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_cache_updater(mut self, updater: Arc<CharacterCacheUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn ProxyHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mount_path(&self) -> String {
        format!("/api/{}", self.name)
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// Proxy one inbound request. Failures before the upstream responds
    /// become a JSON error response; nothing here panics or propagates.
    pub async fn handle(&self, request: Request) -> Response {
        match self.proxy(request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    async fn proxy(&self, request: Request) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let inbound = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        info!(
            route = %self.name,
            method = %parts.method,
            path = %inbound,
            "Incoming proxy request"
        );
        debug!(route = %self.name, headers = ?Redacted(&parts.headers), "Inbound headers");

        let body = body::to_bytes(body, self.limits.max_body_bytes)
            .await
            .map_err(|_| ProxyError::BodyTooLarge)?;

        let rewritten = self.rewriter.rewrite(&inbound);
        let target = self.upstream.target_url(&rewritten)?;
        debug!(route = %self.name, target = %target, "Proxying");

        let mut headers = forwardable_request_headers(&parts.headers);
        if self.change_origin {
            if let Some(host) = self.upstream.host_header() {
                headers.insert(header::HOST, host);
            }
        }

        let token = if self.requires_auth {
            let token = self.bearer_token().await?;
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ProxyError::CredentialExchange("token is not a valid header value".to_string())
            })?;
            headers.insert(header::AUTHORIZATION, value);
            Some(token)
        } else {
            None
        };

        let namespace = self.namespaces.resolve(&rewritten).to_string();
        let namespace_value = HeaderValue::from_str(&namespace)
            .map_err(|_| ProxyError::Configuration(format!("invalid namespace: {}", namespace)))?;
        headers.insert(NAMESPACE_HEADER, namespace_value);
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let ctx = ProxyRequestContext {
            route: self.name.clone(),
            method: parts.method.clone(),
            inbound: inbound.clone(),
            headers: parts.headers,
            body: body.clone(),
            target: target.clone(),
            namespace,
            authenticated: token.is_some(),
        };
        for hook in &self.hooks {
            hook.on_proxy_request(&ctx, &mut headers);
        }

        let upstream = self
            .upstream
            .send(parts.method, target.clone(), headers, body)
            .await
            .inspect_err(|e| {
                error!(
                    route = %self.name,
                    target = %target,
                    error = %e,
                    "Upstream request error"
                )
            })?;

        let status = upstream.status();
        info!(route = %self.name, status = status.as_u16(), "Received upstream response");

        if status == StatusCode::UNAUTHORIZED {
            if let (Some(tokens), Some(token)) = (&self.tokens, &token) {
                tokens.invalidate(token);
            }
        }

        let upstream_headers = upstream.headers().clone();
        let mut client_headers = client_response_headers(&upstream_headers);
        for hook in &self.hooks {
            hook.on_proxy_response_headers(status, &mut client_headers);
        }

        let (tee, body_rx) = TeeStream::new(
            Box::pin(upstream.bytes_stream()),
            self.limits.side_channel_max_bytes,
        );

        let side_channel = SideChannel {
            route: self.name.clone(),
            meta: UpstreamResponseMeta {
                status,
                headers: upstream_headers,
                target,
                inbound: inbound.clone(),
                body_len: None,
            },
            character: (status == StatusCode::OK)
                .then(|| character_from_path(&inbound))
                .flatten(),
            updater: self.updater.clone(),
            hooks: self.hooks.clone(),
            timeout: self.limits.side_channel_timeout,
        };
        tokio::spawn(side_channel.run(body_rx));

        let mut response = Response::new(Body::from_stream(tee));
        *response.status_mut() = status;
        *response.headers_mut() = client_headers;
        Ok(response)
    }

    async fn bearer_token(&self) -> Result<String, ProxyError> {
        let tokens = self.tokens.as_ref().ok_or_else(|| {
            ProxyError::Configuration(format!("route '{}' has no token cache", self.name))
        })?;
        tokens.get_token().await.map_err(|e| {
            error!(route = %self.name, error = %e, "Failed to get access token");
            ProxyError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator(route: RouteConfig) -> ProxyOrchestrator {
        ProxyOrchestrator::new(
            route,
            UpstreamOptions::default(),
            Arc::new(NamespaceResolver::default()),
            ProxyLimits::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_mounted_route_strips_its_prefix() {
        let route = RouteConfig::mounted("wow", "https://us.api.blizzard.com").unwrap();
        assert_eq!(route.mount_path(), "/api/wow");
        let rewriter = PathRewriter::new(route.path_rewrite.clone());
        assert_eq!(rewriter.rewrite("/api/wow/data/wow/item/1"), "/data/wow/item/1");
    }

    #[tokio::test]
    async fn test_auth_route_without_token_cache_is_configuration_error() {
        let mut route = RouteConfig::mounted("wow", "http://127.0.0.1:9").unwrap();
        route.requires_auth = true;
        let proxy = orchestrator(route);

        let response = proxy
            .handle(
                axum::http::Request::builder()
                    .uri("/api/wow/profile/wow/character/arugal/foo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Failed to authenticate with upstream API");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_before_forwarding() {
        let route = RouteConfig::mounted("zamimg", "http://127.0.0.1:9").unwrap();
        let proxy = ProxyOrchestrator::new(
            route,
            UpstreamOptions::default(),
            Arc::new(NamespaceResolver::default()),
            ProxyLimits {
                max_body_bytes: 4,
                ..ProxyLimits::default()
            },
        )
        .unwrap();

        let response = proxy
            .handle(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/zamimg/upload")
                    .body(Body::from("too large"))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
