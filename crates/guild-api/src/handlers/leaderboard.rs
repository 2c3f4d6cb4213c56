//! Leaderboard handlers
//!
//! Supports:
//! - GET /api/guild/top-characters/achievement-points?limit=N
//! - GET /api/guild/top-characters/equipped-item-level?limit=N
//!
//! Both are sorted reads over non-removed cached characters.

use axum::extract::{Query, State};
use axum::Json;
use guild_core::{
    CharacterRecord, StatField, DEFAULT_ACHIEVEMENT_LIMIT, DEFAULT_ITEM_LEVEL_LIMIT,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound on `limit`
pub const MAX_LIMIT: usize = 100;

#[derive(Deserialize, Default)]
pub struct LimitQuery {
    /// Kept as text so a malformed value falls back to the default
    pub limit: Option<String>,
}

impl LimitQuery {
    /// Requested limit, or `default` when missing, unparsable or zero
    pub fn resolve(&self, default: usize) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .map_or(default, |n| n.min(MAX_LIMIT))
    }
}

/// GET /api/guild/top-characters/achievement-points
pub async fn top_by_achievement_points(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<CharacterRecord>>, ApiError> {
    let limit = query.resolve(DEFAULT_ACHIEVEMENT_LIMIT);
    let records = state.store().top_by_achievement_points(limit).await?;
    Ok(leaderboard(StatField::AchievementPoints, limit, records))
}

/// GET /api/guild/top-characters/equipped-item-level
pub async fn top_by_equipped_item_level(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<CharacterRecord>>, ApiError> {
    let limit = query.resolve(DEFAULT_ITEM_LEVEL_LIMIT);
    let records = state
        .store()
        .top_by_equipped_item_level(limit)
        .await
        .map_err(|e| ApiError::store(e, "Failed to fetch top characters by equipped item level"))?;
    Ok(leaderboard(StatField::EquippedItemLevel, limit, records))
}

fn leaderboard(
    field: StatField,
    limit: usize,
    records: Vec<CharacterRecord>,
) -> Json<Vec<CharacterRecord>> {
    tracing::debug!(field = field.column(), limit, count = records.len(), "Leaderboard read");
    Json(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: Option<&str>) -> LimitQuery {
        LimitQuery {
            limit: raw.map(str::to_string),
        }
    }

    #[test]
    fn test_limit_defaults_when_missing_invalid_or_zero() {
        assert_eq!(query(None).resolve(12), 12);
        assert_eq!(query(Some("abc")).resolve(12), 12);
        assert_eq!(query(Some("-3")).resolve(10), 10);
        assert_eq!(query(Some("0")).resolve(10), 10);
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(query(Some("5")).resolve(12), 5);
        assert_eq!(query(Some("5000")).resolve(12), MAX_LIMIT);
    }
}
