//! Repository for the `characters` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guild_core::{CharacterKey, CharacterRecord, CharacterStore, StatField, StoreError, StoreResult};
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::DbPool;

/// Column list for the `characters` table.
const COLUMNS: &str =
    "name, realm, achievement_points, equipped_item_level, last_updated, removed";

#[derive(Debug, FromRow)]
struct CharacterRow {
    name: String,
    realm: String,
    achievement_points: Option<i64>,
    equipped_item_level: Option<i64>,
    last_updated: DateTime<Utc>,
    removed: bool,
}

impl From<CharacterRow> for CharacterRecord {
    fn from(row: CharacterRow) -> Self {
        Self {
            name: row.name,
            realm: row.realm,
            achievement_points: row.achievement_points,
            equipped_item_level: row.equipped_item_level,
            last_updated: row.last_updated,
            removed: row.removed,
        }
    }
}

fn db_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::InvalidRecord(err.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}

/// Provides data access for cached characters.
#[derive(Debug, Clone)]
pub struct PgCharacterStore {
    pool: DbPool,
}

impl PgCharacterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CharacterStore for PgCharacterStore {
    async fn upsert_stat(
        &self,
        key: &CharacterKey,
        field: StatField,
        value: i64,
    ) -> StoreResult<CharacterRecord> {
        // `field.column()` is one of two fixed identifiers, never user input.
        let column = field.column();
        debug!(character = %key, column, value, "Upserting character stat");
        let query = format!(
            "INSERT INTO characters (name, realm, {column}, last_updated) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (name, realm) \
             DO UPDATE SET {column} = EXCLUDED.{column}, last_updated = EXCLUDED.last_updated \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CharacterRow>(&query)
            .bind(key.name())
            .bind(key.realm())
            .bind(value)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map(CharacterRecord::from)
            .map_err(db_error)
    }

    async fn upsert_removed(
        &self,
        key: &CharacterKey,
        removed: bool,
    ) -> StoreResult<CharacterRecord> {
        debug!(character = %key, removed, "Upserting guild membership");
        let query = format!(
            "INSERT INTO characters (name, realm, removed, last_updated) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (name, realm) \
             DO UPDATE SET removed = EXCLUDED.removed, last_updated = EXCLUDED.last_updated \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CharacterRow>(&query)
            .bind(key.name())
            .bind(key.realm())
            .bind(removed)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map(CharacterRecord::from)
            .map_err(db_error)
    }

    async fn get(&self, key: &CharacterKey) -> StoreResult<Option<CharacterRecord>> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE name = $1 AND realm = $2");
        sqlx::query_as::<_, CharacterRow>(&query)
            .bind(key.name())
            .bind(key.realm())
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(CharacterRecord::from))
            .map_err(db_error)
    }

    async fn top_by(&self, field: StatField, limit: usize) -> StoreResult<Vec<CharacterRecord>> {
        let column = field.column();
        let query = format!(
            "SELECT {COLUMNS} FROM characters \
             WHERE removed = false \
             ORDER BY {column} DESC NULLS LAST, name \
             LIMIT $1"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, CharacterRow>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(CharacterRecord::from).collect())
    }
}
