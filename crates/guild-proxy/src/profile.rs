//! Character profile recognition and payload parsing

use std::sync::OnceLock;

use guild_core::{CharacterKey, StatField};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SideChannelError;

fn profile_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/profile/wow/character/([^/]+)/([^/]+)/?$").expect("static regex is valid")
    })
}

/// Extract the character key from a profile URL.
///
/// Only paths *ending* in `/profile/wow/character/{realm}/{name}` match;
/// sub-resources such as `.../{name}/equipment` do not. Any query string
/// is ignored and both segments are percent-decoded before normalization.
pub fn character_from_path(path_and_query: &str) -> Option<CharacterKey> {
    let path = path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path);
    let caps = profile_path_regex().captures(path)?;
    let realm = decode_segment(caps.get(1)?.as_str());
    let name = decode_segment(caps.get(2)?.as_str());
    Some(CharacterKey::new(name, realm))
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// The subset of an upstream character profile the cache cares about.
///
/// Fields are kept as raw JSON so each stat is validated on its own: a
/// malformed stat only invalidates itself, never the membership check or
/// the other stat.
#[derive(Debug, Clone, Default)]
pub struct CharacterProfile {
    guild: Option<Value>,
    achievement_points: Option<Value>,
    equipped_item_level: Option<Value>,
}

impl CharacterProfile {
    /// Parse a profile body. Only a body that is not a JSON object fails.
    pub fn parse(body: &[u8]) -> Result<Self, SideChannelError> {
        let Value::Object(mut fields) = serde_json::from_slice::<Value>(body)? else {
            return Err(SideChannelError::NotAnObject);
        };
        Ok(Self {
            guild: fields.remove("guild"),
            achievement_points: fields.remove(StatField::AchievementPoints.column()),
            equipped_item_level: fields.remove(StatField::EquippedItemLevel.column()),
        })
    }

    /// `None` when absent or null; `Some(Err)` when not a non-negative integer
    pub fn stat(&self, field: StatField) -> Option<Result<u32, SideChannelError>> {
        let raw = match field {
            StatField::AchievementPoints => self.achievement_points.as_ref(),
            StatField::EquippedItemLevel => self.equipped_item_level.as_ref(),
        };
        match raw {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                u32::deserialize(value).map_err(|source| SideChannelError::InvalidStat {
                    field: field.column(),
                    source,
                }),
            ),
        }
    }

    pub fn guild_name(&self) -> Option<&str> {
        self.guild.as_ref()?.get("name")?.as_str()
    }

    /// Case-insensitive guild membership check
    pub fn is_member_of(&self, guild: &str) -> bool {
        self.guild_name()
            .is_some_and(|name| name.trim().to_lowercase() == guild.trim().to_lowercase())
    }
}
