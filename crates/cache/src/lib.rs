//! Reference-counted reactive memoization.
//!
//! Derived values are cached per key and shared between concurrently
//! active subscribers; the last subscriber's teardown releases the entry.
//!
//! # Invariants
//! - A value is never cached because of a read that cannot keep it alive.
//! - Each registered cleanup runs exactly once; releasing an entry that is
//!   already gone is a no-op.
//! - After the last subscriber is torn down, the next request recomputes.

mod cache;

pub use cache::{ReactiveCache, ReactiveScope};

pub fn crate_info() -> &'static str {
    "cospace-cache v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("cache"));
    }
}
