//! The entity-component store: source of truth for queries.
//!
//! # Invariants
//! - An entity holds at most one component per type name.
//! - Every mutation commits as exactly one change batch; subscribers never
//!   observe a partially applied operation.
//! - Entity iteration and query order is creation order, stable across
//!   calls absent further mutation.

pub mod components;
mod world;

pub use world::{
    ChangeBatch, EcsWorld, Provenance, WorldChange, WorldError, WorldSubscription, WorldTxn,
    component,
};

pub fn crate_info() -> &'static str {
    "cospace-world v0.1.0"
}
