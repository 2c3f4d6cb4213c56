//! Side channel: inspect a proxied response after it has been handed to the caller
//!
//! Runs as its own task. Nothing here can reach the caller-facing stream;
//! every failure ends in a log line.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use guild_core::CharacterKey;
use tracing::{debug, warn};

use crate::error::SideChannelError;
use crate::hooks::{ProxyHook, UpstreamResponseMeta};
use crate::profile::CharacterProfile;
use crate::tee::BodyReceiver;
use crate::updater::{CharacterCacheUpdater, ProfileUpdateOutcome};

#[derive(Debug)]
pub enum SideChannelOutcome {
    /// Response was not a successful character profile
    Skipped,
    /// Profile parsed and the cache updates ran
    Updated(ProfileUpdateOutcome),
    Failed(SideChannelError),
}

pub struct SideChannel {
    pub route: String,
    pub meta: UpstreamResponseMeta,
    /// Set when the inbound URL is a character profile and upstream answered 200
    pub character: Option<CharacterKey>,
    pub updater: Option<Arc<CharacterCacheUpdater>>,
    pub hooks: Vec<Arc<dyn ProxyHook>>,
    pub timeout: Duration,
}

impl SideChannel {
    pub async fn run(mut self, body: BodyReceiver) -> SideChannelOutcome {
        let body = self.collect(body).await;
        self.meta.body_len = body.as_ref().ok().map(Bytes::len);

        let outcome = match (&self.character, &self.updater) {
            (Some(key), Some(updater)) => {
                match body.and_then(|b| CharacterProfile::parse(&b)) {
                    Ok(profile) => {
                        SideChannelOutcome::Updated(updater.apply_profile(key, &profile).await)
                    }
                    Err(e) => {
                        warn!(
                            route = %self.route,
                            character = %key,
                            error = %e,
                            "Failed to parse response for cache update"
                        );
                        SideChannelOutcome::Failed(e)
                    }
                }
            }
            _ => {
                if let Err(e) = &body {
                    debug!(route = %self.route, error = %e, "Response body not inspected");
                }
                SideChannelOutcome::Skipped
            }
        };

        for hook in &self.hooks {
            hook.on_proxy_response(&self.meta);
        }
        outcome
    }

    async fn collect(&self, body: BodyReceiver) -> Result<Bytes, SideChannelError> {
        match tokio::time::timeout(self.timeout, body).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SideChannelError::Incomplete),
            Err(_) => Err(SideChannelError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{HeaderMap, StatusCode};
    use guild_core::{CharacterStore, InMemoryCharacterStore};
    use tokio::sync::oneshot;
    use url::Url;

    use super::*;

    #[derive(Default)]
    struct CountingHook(AtomicUsize);

    impl ProxyHook for CountingHook {
        fn on_proxy_response(&self, meta: &UpstreamResponseMeta) {
            assert_eq!(meta.status, StatusCode::OK);
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn side_channel(
        store: Arc<InMemoryCharacterStore>,
        hook: Arc<CountingHook>,
        timeout: Duration,
    ) -> SideChannel {
        SideChannel {
            route: "wow".to_string(),
            meta: UpstreamResponseMeta {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                target: Url::parse("https://upstream.test/profile/wow/character/arugal/foo")
                    .unwrap(),
                inbound: "/api/wow/profile/wow/character/arugal/foo".to_string(),
                body_len: None,
            },
            character: Some(CharacterKey::new("foo", "arugal")),
            updater: Some(Arc::new(CharacterCacheUpdater::new(store, "Low Calibre"))),
            hooks: vec![hook as Arc<dyn ProxyHook>],
            timeout,
        }
    }

    #[tokio::test]
    async fn test_profile_body_updates_cache_then_runs_hooks() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let hook = Arc::new(CountingHook::default());
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(Bytes::from_static(
            br#"{"guild":{"name":"low calibre"},"equipped_item_level":480}"#,
        )))
        .unwrap();

        let outcome = side_channel(store.clone(), hook.clone(), Duration::from_secs(1))
            .run(rx)
            .await;

        assert!(matches!(outcome, SideChannelOutcome::Updated(_)));
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
        let record = store
            .get(&CharacterKey::new("foo", "arugal"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.equipped_item_level, Some(480));
        assert!(!record.removed);
    }

    #[tokio::test]
    async fn test_truncated_body_is_logged_not_applied() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let hook = Arc::new(CountingHook::default());
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(Bytes::from_static(br#"{"guild":{"na"#))).unwrap();

        let outcome = side_channel(store.clone(), hook.clone(), Duration::from_secs(1))
            .run(rx)
            .await;

        assert!(matches!(
            outcome,
            SideChannelOutcome::Failed(SideChannelError::Parse(_))
        ));
        assert!(store.is_empty());
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_body_timeout_gives_up() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let (_tx, rx) = oneshot::channel::<Result<Bytes, SideChannelError>>();

        let outcome = side_channel(store.clone(), Arc::default(), Duration::from_millis(20))
            .run(rx)
            .await;

        assert!(matches!(
            outcome,
            SideChannelOutcome::Failed(SideChannelError::Timeout)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_non_profile_response_is_skipped() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let mut channel = side_channel(store.clone(), Arc::default(), Duration::from_secs(1));
        channel.character = None;
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(Bytes::from_static(b"not json"))).unwrap();

        assert!(matches!(channel.run(rx).await, SideChannelOutcome::Skipped));
        assert!(store.is_empty());
    }
}
