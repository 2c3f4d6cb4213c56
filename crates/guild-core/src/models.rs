//! Character cache data model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Natural key of a cached character.
///
/// Name and realm are trimmed and lowercased on construction so that
/// `"Foo"/"Arugal"` and `"foo"/"arugal"` address the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterKey {
    name: String,
    realm: String,
}

impl CharacterKey {
    pub fn new(name: impl AsRef<str>, realm: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_lowercase(),
            realm: realm.as_ref().trim().to_lowercase(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }
}

impl fmt::Display for CharacterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.realm, self.name)
    }
}

/// Numeric character stats cached from upstream profile payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatField {
    AchievementPoints,
    EquippedItemLevel,
}

impl StatField {
    /// Column / field name used by storage engines
    pub fn column(&self) -> &'static str {
        match self {
            StatField::AchievementPoints => "achievement_points",
            StatField::EquippedItemLevel => "equipped_item_level",
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A cached character row.
///
/// Stats are `None` until an upstream payload has supplied them; a later
/// payload that omits a stat never clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    pub name: String,
    pub realm: String,
    pub achievement_points: Option<i64>,
    pub equipped_item_level: Option<i64>,
    pub last_updated: DateTime<Utc>,
    /// True when the character is not currently a member of the tracked guild
    pub removed: bool,
}

impl CharacterRecord {
    /// A fresh record with no stats, as created by the first upsert for a key
    pub fn new(key: &CharacterKey, now: DateTime<Utc>) -> Self {
        Self {
            name: key.name().to_string(),
            realm: key.realm().to_string(),
            achievement_points: None,
            equipped_item_level: None,
            last_updated: now,
            removed: false,
        }
    }

    pub fn key(&self) -> CharacterKey {
        CharacterKey::new(&self.name, &self.realm)
    }

    pub fn stat(&self, field: StatField) -> Option<i64> {
        match field {
            StatField::AchievementPoints => self.achievement_points,
            StatField::EquippedItemLevel => self.equipped_item_level,
        }
    }

    pub fn set_stat(&mut self, field: StatField, value: i64) {
        match field {
            StatField::AchievementPoints => self.achievement_points = Some(value),
            StatField::EquippedItemLevel => self.equipped_item_level = Some(value),
        }
    }
}
