//! Player Identifiers
//!
//! Short opaque strings naming one participant for the lifetime of a session.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Longest player id accepted off the wire, in bytes.
pub const MAX_PLAYER_ID_LEN: usize = 32;

/// Length of a generated player id.
const GENERATED_ID_LEN: usize = 8;

/// Unique participant identifier.
///
/// Serialized as a bare JSON string. Implements `Ord` so registries can use
/// a `BTreeMap` and iterate in a stable order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier from a v4 UUID.
    ///
    /// Eight upper-case hex digits: 32 random bits, ample for a handful of peers.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(uuid[..GENERATED_ID_LEN].to_ascii_uppercase())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id may appear on the wire.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= MAX_PLAYER_ID_LEN
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_short_and_valid() {
        let id = PlayerId::generate();
        assert_eq!(id.as_str().len(), GENERATED_ID_LEN);
        assert!(id.is_valid());
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = PlayerId::generate();
        let b = PlayerId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_validity_bounds() {
        assert!(!PlayerId::new("").is_valid());
        assert!(PlayerId::new("H001").is_valid());
        assert!(PlayerId::new("x".repeat(MAX_PLAYER_ID_LEN)).is_valid());
        assert!(!PlayerId::new("x".repeat(MAX_PLAYER_ID_LEN + 1)).is_valid());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerId::new("C002")).unwrap();
        assert_eq!(json, "\"C002\"");
    }
}
