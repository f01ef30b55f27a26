use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an entity in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an entity id from its hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, ParseEntityIdError> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error from parsing an entity id string.
#[derive(Debug, thiserror::Error)]
#[error("invalid entity id: {0}")]
pub struct ParseEntityIdError(#[from] uuid::Error);

/// Planar transform: an origin point and an orientation basis vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2d {
    pub origin: Vec2,
    pub orientation: Vec2,
}

impl Default for Transform2d {
    fn default() -> Self {
        Self {
            origin: Vec2::ZERO,
            orientation: Vec2::X,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_display_roundtrip() {
        let id = EntityId::new();
        let parsed = EntityId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn entity_id_parse_rejects_garbage() {
        assert!(EntityId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform2d::default();
        assert_eq!(t.origin, Vec2::ZERO);
        assert_eq!(t.orientation, Vec2::X);
    }
}
