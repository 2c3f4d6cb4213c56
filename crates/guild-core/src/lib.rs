//! guild-core - Core types and traits for the guild site backend
//!
//! This crate holds the character cache data model and the narrow
//! update/query contract (`CharacterStore`) that the proxy side channel
//! writes through and the leaderboard endpoints read from. Storage engines
//! live in their own crates; an in-memory store is provided here for
//! database-less deployments and tests.

pub mod error;
pub mod memory;
pub mod models;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryCharacterStore;
pub use models::{CharacterKey, CharacterRecord, StatField};
pub use store::{CharacterStore, DEFAULT_ACHIEVEMENT_LIMIT, DEFAULT_ITEM_LEVEL_LIMIT};
