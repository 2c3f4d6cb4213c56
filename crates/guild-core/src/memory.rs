//! In-memory character store
//!
//! Used when no database is configured and throughout the test suites.
//! A single write lock is held for each upsert, which makes the
//! find-or-create-then-set sequence atomic per key.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::StoreResult;
use crate::models::{CharacterKey, CharacterRecord, StatField};
use crate::store::CharacterStore;

#[derive(Debug, Default)]
pub struct InMemoryCharacterStore {
    records: RwLock<HashMap<CharacterKey, CharacterRecord>>,
}

impl InMemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Insert or replace a full record (seeding for tests and fixtures)
    pub fn insert(&self, record: CharacterRecord) {
        self.records.write().insert(record.key(), record);
    }

    fn update<F>(&self, key: &CharacterKey, apply: F) -> CharacterRecord
    where
        F: FnOnce(&mut CharacterRecord),
    {
        let now = Utc::now();
        let mut records = self.records.write();
        let record = records
            .entry(key.clone())
            .or_insert_with(|| CharacterRecord::new(key, now));
        apply(record);
        record.last_updated = now;
        record.clone()
    }
}

#[async_trait]
impl CharacterStore for InMemoryCharacterStore {
    async fn upsert_stat(
        &self,
        key: &CharacterKey,
        field: StatField,
        value: i64,
    ) -> StoreResult<CharacterRecord> {
        Ok(self.update(key, |record| record.set_stat(field, value)))
    }

    async fn upsert_removed(
        &self,
        key: &CharacterKey,
        removed: bool,
    ) -> StoreResult<CharacterRecord> {
        Ok(self.update(key, |record| record.removed = removed))
    }

    async fn get(&self, key: &CharacterKey) -> StoreResult<Option<CharacterRecord>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn top_by(&self, field: StatField, limit: usize) -> StoreResult<Vec<CharacterRecord>> {
        let mut active: Vec<CharacterRecord> = self
            .records
            .read()
            .values()
            .filter(|r| !r.removed)
            .cloned()
            .collect();

        // Descending by stat, missing stats last, name as a stable tiebreak
        active.sort_by(|a, b| {
            b.stat(field)
                .cmp(&a.stat(field))
                .then_with(|| a.name.cmp(&b.name))
        });
        active.truncate(limit);
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, points: i64, removed: bool) -> CharacterRecord {
        let mut r = CharacterRecord::new(&CharacterKey::new(name, "arugal"), Utc::now());
        r.achievement_points = Some(points);
        r.removed = removed;
        r
    }

    #[tokio::test]
    async fn test_partial_field_upserts_merge() {
        let store = InMemoryCharacterStore::new();
        let key = CharacterKey::new("foo", "arugal");

        let first = store.upsert_achievement_points(&key, 5000).await.unwrap();
        assert_eq!(first.achievement_points, Some(5000));
        assert_eq!(first.equipped_item_level, None);

        let second = store.upsert_equipped_item_level(&key, 480).await.unwrap();
        assert_eq!(second.achievement_points, Some(5000));
        assert_eq!(second.equipped_item_level, Some(480));
        assert!(second.last_updated >= first.last_updated);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_upserts_never_duplicate_rows() {
        let store = InMemoryCharacterStore::new();

        store
            .upsert_achievement_points(&CharacterKey::new("bar", "area52"), 10)
            .await
            .unwrap();
        store
            .upsert_achievement_points(&CharacterKey::new("Bar", "Area52"), 20)
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let stored = store
            .get(&CharacterKey::new("bar", "area52"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.achievement_points, Some(20));
    }

    #[tokio::test]
    async fn test_removed_upsert_creates_record() {
        let store = InMemoryCharacterStore::new();
        let key = CharacterKey::new("baz", "arugal");

        let created = store.upsert_removed(&key, true).await.unwrap();
        assert!(created.removed);
        assert_eq!(created.achievement_points, None);

        let restored = store.upsert_removed(&key, false).await.unwrap();
        assert!(!restored.removed);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_top_by_excludes_removed_and_orders_descending() {
        let store = InMemoryCharacterStore::new();
        store.insert(record("a", 1000, false));
        store.insert(record("b", 3000, false));
        store.insert(record("c", 5000, true));

        let top = store.top_by_achievement_points(2).await.unwrap();
        let names: Vec<&str> = top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_top_by_sorts_missing_stats_last() {
        let store = InMemoryCharacterStore::new();
        store.insert(record("a", 1000, false));
        store
            .upsert_removed(&CharacterKey::new("z", "arugal"), false)
            .await
            .unwrap();

        let top = store.top_by_achievement_points(10).await.unwrap();
        let names: Vec<&str> = top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "z"]);

        let by_ilvl = store.top_by_equipped_item_level(1).await.unwrap();
        assert_eq!(by_ilvl.len(), 1);
    }
}
