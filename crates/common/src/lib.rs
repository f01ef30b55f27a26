//! Shared types for the cospace engine: entity identity and example values.
//!
//! # Invariants
//! - Entity ids are globally unique (UUIDv4) and totally ordered.
//! - Nothing in this crate depends on the store, document, or projection.

mod types;

pub use types::{EntityId, ParseEntityIdError, Transform2d};

pub fn crate_info() -> &'static str {
    "cospace-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
