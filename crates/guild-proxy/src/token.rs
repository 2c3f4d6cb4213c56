//! Shared bearer token cache for the upstream API
//!
//! One `TokenCache` is built per process and shared by every authenticated
//! route. A cached token is usable while `now < expires_at`; there is no
//! early-refresh margin. Refreshes are single-flight: concurrent misses
//! queue on an async mutex and re-check the cache once they hold it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CredentialError;

/// Upper bound on an advertised `expires_in` (one year)
const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Source of "now" for expiry checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Token as returned by the identity provider
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// Performs one credential exchange against an identity provider
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> Result<IssuedToken, CredentialError>;
}

/// OAuth2 `client_credentials` grant over HTTP
pub struct ClientCredentialsExchange {
    http: reqwest::Client,
    token_url: Url,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl ClientCredentialsExchange {
    pub fn new(
        token_url: Url,
        client_id: Option<String>,
        client_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token_url,
            client_id: client_id.filter(|s| !s.is_empty()),
            client_secret: client_secret.filter(|s| !s.is_empty()),
        })
    }
}

#[async_trait]
impl CredentialExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> Result<IssuedToken, CredentialError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(CredentialError::NotConfigured);
        };

        debug!(url = %self.token_url, "Requesting access token");

        let response = self
            .http
            .post(self.token_url.clone())
            .basic_auth(client_id, Some(client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice::<IssuedToken>(&bytes)
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))
    }
}

/// A bearer token and the instant it stops being usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub struct TokenCache {
    exchange: Arc<dyn CredentialExchange>,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl TokenCache {
    pub fn new(exchange: Arc<dyn CredentialExchange>) -> Self {
        Self::with_clock(exchange, Arc::new(SystemClock))
    }

    pub fn with_clock(exchange: Arc<dyn CredentialExchange>, clock: Arc<dyn Clock>) -> Self {
        Self {
            exchange,
            clock,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Return a usable token, exchanging credentials only on a miss
    pub async fn get_token(&self) -> Result<String, CredentialError> {
        if let Some(token) = self.usable() {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.usable() {
            return Ok(token);
        }

        let issued = self.exchange.exchange().await?;
        let lifetime = issued.expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS);
        let expires_at = self.clock.now() + chrono::Duration::seconds(lifetime);
        info!(expires_at = %expires_at, "Obtained new access token");

        *self.cached.write() = Some(CachedToken {
            value: issued.access_token.clone(),
            expires_at,
        });
        Ok(issued.access_token)
    }

    /// Drop the cached token if it is still `token`.
    ///
    /// Called when the upstream rejects a request with 401. A token that
    /// was already replaced by a newer exchange is left alone.
    pub fn invalidate(&self, token: &str) -> bool {
        let mut cached = self.cached.write();
        if cached.as_ref().is_some_and(|c| c.value == token) {
            warn!("Upstream rejected cached access token, invalidating");
            *cached = None;
            true
        } else {
            false
        }
    }

    /// Snapshot of the cached token, usable or not
    pub fn cached(&self) -> Option<CachedToken> {
        self.cached.read().clone()
    }

    fn usable(&self) -> Option<String> {
        let now = self.clock.now();
        self.cached
            .read()
            .as_ref()
            .filter(|c| c.is_usable(now))
            .map(|c| c.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct ManualClock(parking_lot::Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Self {
            Self(parking_lot::Mutex::new(Utc::now()))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock() += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    #[derive(Default)]
    struct CountingExchange {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CredentialExchange for CountingExchange {
        async fn exchange(&self) -> Result<IssuedToken, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Widen the race window for the single-flight test
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(CredentialError::Rejected { status: 401 });
            }
            Ok(IssuedToken {
                access_token: format!("token-{}", n),
                expires_in: 60,
            })
        }
    }

    fn cache(exchange: Arc<CountingExchange>, clock: Arc<ManualClock>) -> TokenCache {
        TokenCache::with_clock(exchange, clock)
    }

    #[tokio::test]
    async fn test_unexpired_token_is_reused() {
        let exchange = Arc::new(CountingExchange::default());
        let clock = Arc::new(ManualClock::new());
        let tokens = cache(exchange.clone(), clock.clone());

        assert_eq!(tokens.get_token().await.unwrap(), "token-1");
        clock.advance(59);
        assert_eq!(tokens.get_token().await.unwrap(), "token-1");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_one_exchange() {
        let exchange = Arc::new(CountingExchange::default());
        let clock = Arc::new(ManualClock::new());
        let tokens = cache(exchange.clone(), clock.clone());

        tokens.get_token().await.unwrap();
        // Exactly at expiry the token is no longer usable
        clock.advance(60);
        assert_eq!(tokens.get_token().await.unwrap(), "token-2");
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);

        let cached = tokens.cached().unwrap();
        assert_eq!(cached.value, "token-2");
        assert_eq!(cached.expires_at, clock.now() + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_exchange() {
        let exchange = Arc::new(CountingExchange::default());
        let tokens = Arc::new(cache(exchange.clone(), Arc::new(ManualClock::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = tokens.clone();
                tokio::spawn(async move { tokens.get_token().await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "token-1");
        }
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_exchange_is_not_cached() {
        let exchange = Arc::new(CountingExchange {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let tokens = cache(exchange.clone(), Arc::new(ManualClock::new()));

        assert!(matches!(
            tokens.get_token().await,
            Err(CredentialError::Rejected { status: 401 })
        ));
        assert!(tokens.cached().is_none());
        assert!(tokens.get_token().await.is_err());
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_only_clears_matching_token() {
        let exchange = Arc::new(CountingExchange::default());
        let tokens = cache(exchange.clone(), Arc::new(ManualClock::new()));

        let token = tokens.get_token().await.unwrap();
        assert!(!tokens.invalidate("some-older-token"));
        assert!(tokens.cached().is_some());

        assert!(tokens.invalidate(&token));
        assert_eq!(tokens.get_token().await.unwrap(), "token-2");
    }

    #[test]
    fn test_missing_credentials_fail_without_network() {
        let exchange = ClientCredentialsExchange::new(
            Url::parse("http://127.0.0.1:9/token").unwrap(),
            Some("id".to_string()),
            Some(String::new()),
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(matches!(
            tokio_test::block_on(exchange.exchange()),
            Err(CredentialError::NotConfigured)
        ));
    }
}
