//! Typed component codecs and the runtime component-type registry.
//!
//! Raw document data is `serde_json::Value`; a [`Schema`] validates it into
//! a typed value and serializes it back. Component kinds are registered by
//! stable name so they can be (de)serialized without static type knowledge.
//!
//! # Invariants
//! - `validate(serialize(v))` equals `v` for every value `v` a schema accepts.
//! - Composite schemas report the field path of the first mismatch.
//! - A name is registered at most once; lookup of an unknown name is not an
//!   error.

mod registry;
mod schema;

pub use registry::{ComponentRegistry, ComponentType, ComponentValue, RegistryError};
pub use schema::{
    BoolSchema, Mapped, NumberSchema, Object1, Object2, Object3, Schema, SchemaError, SchemaExt,
    SeqSchema, TextSchema, boolean, number, object1, object2, object3, seq, text,
};

pub fn crate_info() -> &'static str {
    "cospace-schema v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("schema"));
    }
}
