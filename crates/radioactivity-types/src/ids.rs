//! Opaque entity identifiers.
//!
//! The engine never interprets an entity id. It only guarantees that every
//! id it stores is a non-empty, bounded string without control characters
//! or surrounding whitespace, so that ids are safe to use as map keys,
//! database keys and log fields.

use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

/// Maximum length of an entity id in bytes.
pub const MAX_ENTITY_ID_LEN: usize = 255;

/// Reasons an entity id string is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityIdError {
    /// The id is the empty string.
    #[error("entity id is empty")]
    Empty,

    /// The id exceeds [`MAX_ENTITY_ID_LEN`] bytes.
    #[error("entity id is {len} bytes long (max {MAX_ENTITY_ID_LEN})")]
    TooLong {
        /// Actual length in bytes.
        len: usize,
    },

    /// The id has leading or trailing whitespace.
    #[error("entity id has surrounding whitespace")]
    Whitespace,

    /// The id contains a control character.
    #[error("entity id contains a control character")]
    ControlCharacter,
}

/// Identifier of the content entity a score is tracked for.
///
/// Construct with [`EntityId::parse`]; deserialization runs the same
/// checks, so a decoded `EntityId` is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct EntityId(String);

impl EntityId {
    /// Validate `raw` and wrap it as an entity id.
    ///
    /// # Errors
    ///
    /// Returns an [`EntityIdError`] describing the first rule `raw` breaks.
    pub fn parse(raw: &str) -> Result<Self, EntityIdError> {
        if raw.is_empty() {
            return Err(EntityIdError::Empty);
        }
        if raw.len() > MAX_ENTITY_ID_LEN {
            return Err(EntityIdError::TooLong { len: raw.len() });
        }
        if raw.trim() != raw {
            return Err(EntityIdError::Whitespace);
        }
        if raw.chars().any(char::is_control) {
            return Err(EntityIdError::ControlCharacter);
        }
        Ok(Self(raw.to_owned()))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
