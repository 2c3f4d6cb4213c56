//! CharacterStore trait - the update/query contract for cached characters

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{CharacterKey, CharacterRecord, StatField};

/// Default `limit` for the achievement points leaderboard
pub const DEFAULT_ACHIEVEMENT_LIMIT: usize = 12;
/// Default `limit` for the equipped item level leaderboard
pub const DEFAULT_ITEM_LEVEL_LIMIT: usize = 10;

/// Persistent store of cached character stats.
///
/// Every upsert finds the record by key or creates it, sets exactly one
/// field plus a refreshed `last_updated`, and returns the updated record.
/// Implementations must make each upsert atomic per key; there is no
/// ordering between concurrent upserts for the same key (last write wins
/// per field).
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Set a single stat field on the record for `key`
    async fn upsert_stat(
        &self,
        key: &CharacterKey,
        field: StatField,
        value: i64,
    ) -> StoreResult<CharacterRecord>;

    /// Set the guild membership flag on the record for `key`
    async fn upsert_removed(&self, key: &CharacterKey, removed: bool)
        -> StoreResult<CharacterRecord>;

    /// Fetch a single record
    async fn get(&self, key: &CharacterKey) -> StoreResult<Option<CharacterRecord>>;

    /// Records with `removed = false`, ordered descending by `field`,
    /// truncated to `limit`. Records missing the stat sort last.
    async fn top_by(&self, field: StatField, limit: usize) -> StoreResult<Vec<CharacterRecord>>;

    async fn upsert_achievement_points(
        &self,
        key: &CharacterKey,
        value: i64,
    ) -> StoreResult<CharacterRecord> {
        self.upsert_stat(key, StatField::AchievementPoints, value)
            .await
    }

    async fn upsert_equipped_item_level(
        &self,
        key: &CharacterKey,
        value: i64,
    ) -> StoreResult<CharacterRecord> {
        self.upsert_stat(key, StatField::EquippedItemLevel, value)
            .await
    }

    async fn top_by_achievement_points(&self, limit: usize) -> StoreResult<Vec<CharacterRecord>> {
        self.top_by(StatField::AchievementPoints, limit).await
    }

    async fn top_by_equipped_item_level(&self, limit: usize) -> StoreResult<Vec<CharacterRecord>> {
        self.top_by(StatField::EquippedItemLevel, limit).await
    }
}
