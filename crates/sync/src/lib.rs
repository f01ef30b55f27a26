//! Bidirectional synchronization between the entity store and the shared
//! document.
//!
//! Local world batches become one document transaction each; remote
//! document batches replay into the world as one transaction each. The
//! document's own merge picks conflict winners; this crate only translates
//! structure.
//!
//! # Invariants
//! - After any batch finishes applying, decoding the document through the
//!   registry equals the world's component set for every registered type.
//! - A replayed mutation never produces a further document write.
//! - Unknown component types and malformed component data are skipped
//!   without aborting the surrounding batch; their raw registers stay in
//!   the document.

pub mod layout;
mod projection;

pub use layout::{ResolvedPath, component_path, entities_root, entity_path, resolve};
pub use projection::{Projection, decode_document, export_world};

pub fn crate_info() -> &'static str {
    "cospace-sync v0.1.0"
}
