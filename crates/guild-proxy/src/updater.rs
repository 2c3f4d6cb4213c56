//! CharacterCacheUpdater - writes profile-derived stats into the character store

use std::sync::Arc;

use guild_core::{CharacterKey, CharacterRecord, CharacterStore, StatField, StoreResult};
use tracing::{debug, error, warn};

use crate::error::SideChannelError;
use crate::profile::CharacterProfile;

/// What happened to each upsert of one profile. `None` means not attempted.
#[derive(Debug, Default)]
pub struct ProfileUpdateOutcome {
    pub achievement_points: Option<StoreResult<CharacterRecord>>,
    pub equipped_item_level: Option<StoreResult<CharacterRecord>>,
    pub removed: Option<StoreResult<CharacterRecord>>,
    /// Stats present in the payload but skipped as malformed
    pub invalid: Vec<SideChannelError>,
}

pub struct CharacterCacheUpdater {
    store: Arc<dyn CharacterStore>,
    tracked_guild: String,
}

impl CharacterCacheUpdater {
    pub fn new(store: Arc<dyn CharacterStore>, tracked_guild: impl Into<String>) -> Self {
        Self {
            store,
            tracked_guild: tracked_guild.into().trim().to_lowercase(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CharacterStore> {
        &self.store
    }

    pub fn tracked_guild(&self) -> &str {
        &self.tracked_guild
    }

    pub async fn upsert_achievement_points(
        &self,
        key: &CharacterKey,
        value: i64,
    ) -> StoreResult<CharacterRecord> {
        self.store.upsert_achievement_points(key, value).await
    }

    pub async fn upsert_equipped_item_level(
        &self,
        key: &CharacterKey,
        value: i64,
    ) -> StoreResult<CharacterRecord> {
        self.store.upsert_equipped_item_level(key, value).await
    }

    pub async fn upsert_removed_flag(
        &self,
        key: &CharacterKey,
        removed: bool,
    ) -> StoreResult<CharacterRecord> {
        self.store.upsert_removed(key, removed).await
    }

    /// Apply one successful profile fetch to the cache.
    ///
    /// Valid stats are upserted and the membership flag is always
    /// recomputed. A malformed stat is skipped without affecting the other
    /// upserts, which run concurrently and fail independently.
    pub async fn apply_profile(
        &self,
        key: &CharacterKey,
        profile: &CharacterProfile,
    ) -> ProfileUpdateOutcome {
        let member = profile.is_member_of(&self.tracked_guild);
        debug!(
            character = %key,
            member,
            guild = profile.guild_name().unwrap_or("-"),
            "Updating cached character"
        );

        let mut invalid = Vec::new();
        let points = valid_stat(key, profile, StatField::AchievementPoints, &mut invalid);
        let level = valid_stat(key, profile, StatField::EquippedItemLevel, &mut invalid);

        let achievement = async {
            let points = points?;
            let result = self.upsert_achievement_points(key, i64::from(points)).await;
            if let Err(e) = &result {
                error!(
                    character = %key,
                    error = %e,
                    "Failed to update character achievement points"
                );
            }
            Some(result)
        };

        let item_level = async {
            let level = level?;
            let result = self.upsert_equipped_item_level(key, i64::from(level)).await;
            if let Err(e) = &result {
                error!(
                    character = %key,
                    error = %e,
                    "Failed to update character equipped item level"
                );
            }
            Some(result)
        };

        let removed = async {
            let result = self.upsert_removed_flag(key, !member).await;
            if let Err(e) = &result {
                error!(character = %key, error = %e, "Failed to update character removed status");
            }
            Some(result)
        };

        let (achievement_points, equipped_item_level, removed) =
            tokio::join!(achievement, item_level, removed);

        ProfileUpdateOutcome {
            achievement_points,
            equipped_item_level,
            removed,
            invalid,
        }
    }
}

fn valid_stat(
    key: &CharacterKey,
    profile: &CharacterProfile,
    field: StatField,
    invalid: &mut Vec<SideChannelError>,
) -> Option<u32> {
    match profile.stat(field)? {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(character = %key, error = %e, "Skipping malformed character stat");
            invalid.push(e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use guild_core::{InMemoryCharacterStore, StoreError};

    use super::*;

    /// Store whose stat writes always fail
    struct BrokenStatStore(InMemoryCharacterStore);

    #[async_trait]
    impl CharacterStore for BrokenStatStore {
        async fn upsert_stat(
            &self,
            _key: &CharacterKey,
            _field: StatField,
            _value: i64,
        ) -> StoreResult<CharacterRecord> {
            Err(StoreError::Database("disk full".to_string()))
        }

        async fn upsert_removed(
            &self,
            key: &CharacterKey,
            removed: bool,
        ) -> StoreResult<CharacterRecord> {
            self.0.upsert_removed(key, removed).await
        }

        async fn get(&self, key: &CharacterKey) -> StoreResult<Option<CharacterRecord>> {
            self.0.get(key).await
        }

        async fn top_by(
            &self,
            field: StatField,
            limit: usize,
        ) -> StoreResult<Vec<CharacterRecord>> {
            self.0.top_by(field, limit).await
        }
    }

    fn profile(json: &str) -> CharacterProfile {
        CharacterProfile::parse(json.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_member_profile_updates_all_fields() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let updater = CharacterCacheUpdater::new(store.clone(), "Low Calibre");
        let key = CharacterKey::new("Foo", "Arugal");

        let outcome = updater
            .apply_profile(
                &key,
                &profile(concat!(
                    r#"{"guild":{"name":"Low Calibre"},"#,
                    r#""achievement_points":5000,"equipped_item_level":480}"#
                )),
            )
            .await;
        assert!(outcome.achievement_points.unwrap().is_ok());
        assert!(outcome.equipped_item_level.unwrap().is_ok());

        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.achievement_points, Some(5000));
        assert_eq!(record.equipped_item_level, Some(480));
        assert!(!record.removed);
    }

    #[tokio::test]
    async fn test_non_member_without_stats_is_marked_removed() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let updater = CharacterCacheUpdater::new(store.clone(), "Low Calibre");
        let key = CharacterKey::new("foo", "arugal");

        store.upsert_achievement_points(&key, 1234).await.unwrap();
        let outcome = updater
            .apply_profile(&key, &profile(r#"{"guild":{"name":"Other"}}"#))
            .await;
        assert!(outcome.achievement_points.is_none());
        assert!(outcome.equipped_item_level.is_none());

        let record = store.get(&key).await.unwrap().unwrap();
        assert!(record.removed);
        assert_eq!(record.achievement_points, Some(1234));
    }

    #[tokio::test]
    async fn test_stat_failures_do_not_block_removed_flag() {
        let store = Arc::new(BrokenStatStore(InMemoryCharacterStore::new()));
        let updater = CharacterCacheUpdater::new(store.clone(), "low calibre");
        let key = CharacterKey::new("foo", "arugal");

        let outcome = updater
            .apply_profile(
                &key,
                &profile(concat!(
                    r#"{"guild":{"name":"Low Calibre"},"#,
                    r#""achievement_points":1,"equipped_item_level":2}"#
                )),
            )
            .await;
        assert!(outcome.achievement_points.unwrap().is_err());
        assert!(outcome.equipped_item_level.unwrap().is_err());
        assert!(outcome.removed.unwrap().is_ok());

        let record = store.get(&key).await.unwrap().unwrap();
        assert!(!record.removed);
        assert_eq!(record.achievement_points, None);
    }

    #[tokio::test]
    async fn test_malformed_stat_skips_only_that_upsert() {
        let store = Arc::new(InMemoryCharacterStore::new());
        let updater = CharacterCacheUpdater::new(store.clone(), "Low Calibre");
        let key = CharacterKey::new("foo", "arugal");

        store.upsert_achievement_points(&key, 900).await.unwrap();
        store.upsert_removed(&key, false).await.unwrap();

        let outcome = updater
            .apply_profile(
                &key,
                &profile(concat!(
                    r#"{"achievement_points":1234.5,"equipped_item_level":480,"#,
                    r#""guild":{"name":"Other Guild"}}"#
                )),
            )
            .await;
        assert!(outcome.achievement_points.is_none());
        assert!(outcome.equipped_item_level.unwrap().is_ok());
        assert!(outcome.removed.unwrap().is_ok());
        assert!(matches!(
            outcome.invalid.as_slice(),
            [SideChannelError::InvalidStat {
                field: "achievement_points",
                ..
            }]
        ));

        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.achievement_points, Some(900));
        assert_eq!(record.equipped_item_level, Some(480));
        assert!(record.removed);
    }
}
