//! The shared document: a mergeable tree of last-write-wins registers.
//!
//! This is the persistence and collaboration side of the engine. Writers
//! apply atomic transactions, subscribers receive each transaction as one
//! patch batch, and replicas converge by exchanging register state with
//! per-register stamps picking winners deterministically.
//!
//! # Invariants
//! - A transaction is visible to subscribers as exactly one batch.
//! - Deletions tombstone; they merge the same way writes do.
//! - Two replicas that exchange updates in both directions hold identical
//!   register state afterwards.

mod doc;
mod path;
pub mod store;

pub use doc::{DocSubscription, DocTxn, DocUpdate, Document, Patch, PatchBatch, PatchOp, Stamp};
pub use path::DocPath;
pub use store::{DocStoreError, load_document, save_document};

pub fn crate_info() -> &'static str {
    "cospace-doc v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("doc"));
    }
}
