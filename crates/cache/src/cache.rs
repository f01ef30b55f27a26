use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

/// Collects cleanup callbacks for one reactive computation scope.
///
/// The host runtime's contract: a cleanup registered during a computation
/// runs exactly once, when the scope is disposed (or dropped). In a host
/// without an ambient reactive runtime, callers hold a scope explicitly
/// around each subscription's lifetime.
#[derive(Default)]
pub struct ReactiveScope {
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl ReactiveScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback to run at disposal.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        self.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Run all registered cleanups. Disposing twice is a no-op.
    pub fn dispose(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }
}

impl Drop for ReactiveScope {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct CacheEntry<V> {
    compute: Box<dyn Fn() -> V>,
    /// `None` after invalidation; recomputed lazily on next access.
    value: RefCell<Option<V>>,
    subscribers: Cell<usize>,
}

impl<V: Clone> CacheEntry<V> {
    fn current(&self) -> V {
        let cached = self.value.borrow().clone();
        match cached {
            Some(value) => value,
            None => {
                tracing::trace!("cache entry stale, recomputing");
                let value = (self.compute)();
                *self.value.borrow_mut() = Some(value.clone());
                value
            }
        }
    }
}

type EntryMap<K, V> = RefCell<HashMap<K, Rc<CacheEntry<V>>>>;

/// Keyed memoization with a reference-counted lifecycle.
///
/// An entry stays alive exactly as long as at least one reactive scope
/// holds it; the last scope's cleanup removes it. Reads outside any scope
/// see the current value but never create or keep an entry alive.
///
/// Handles are cheap clones sharing one entry table.
#[derive(Default)]
pub struct ReactiveCache<K, V> {
    entries: Rc<EntryMap<K, V>>,
}

impl<K, V> Clone for ReactiveCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
        }
    }
}

impl<K, V> ReactiveCache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Get or compute the value for `key`.
    ///
    /// Inside a scope, the entry is shared: the first caller computes, every
    /// concurrent subscriber reuses, and the entry lives until the last
    /// subscribing scope is disposed. Outside any scope the call never
    /// caches: an existing entry is read, a missing one is computed and
    /// discarded.
    pub fn cached(
        &self,
        key: K,
        scope: Option<&ReactiveScope>,
        compute: impl Fn() -> V + 'static,
    ) -> V {
        let existing = self.entries.borrow().get(&key).map(Rc::clone);
        match (existing, scope) {
            (Some(entry), Some(scope)) => {
                entry.subscribers.set(entry.subscribers.get() + 1);
                self.register_release(scope, key);
                entry.current()
            }
            (Some(entry), None) => entry.current(),
            (None, Some(scope)) => {
                let value = compute();
                let entry = Rc::new(CacheEntry {
                    compute: Box::new(compute),
                    value: RefCell::new(Some(value.clone())),
                    subscribers: Cell::new(1),
                });
                self.entries.borrow_mut().insert(key.clone(), entry);
                self.register_release(scope, key);
                value
            }
            (None, None) => compute(),
        }
    }

    /// Mark the entry for `key` stale. The next access recomputes through
    /// the entry's stored computation. Unknown keys are ignored.
    pub fn invalidate(&self, key: &K) {
        if let Some(entry) = self.entries.borrow().get(key) {
            *entry.value.borrow_mut() = None;
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Active subscriber count for `key`, zero if no entry exists.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.entries
            .borrow()
            .get(key)
            .map_or(0, |entry| entry.subscribers.get())
    }

    fn register_release(&self, scope: &ReactiveScope, key: K) {
        let entries = Rc::clone(&self.entries);
        scope.on_cleanup(move || release(&entries, &key));
    }
}

/// Drop one subscriber reference; the entry and its resources are released
/// when the count reaches zero. Releasing a missing entry is a no-op.
fn release<K: Eq + Hash, V>(entries: &EntryMap<K, V>, key: &K) {
    let gone = {
        let map = entries.borrow();
        match map.get(key) {
            Some(entry) => {
                let count = entry.subscribers.get();
                entry.subscribers.set(count.saturating_sub(1));
                count <= 1
            }
            None => false,
        }
    };
    if gone {
        entries.borrow_mut().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(counter: &Rc<Cell<usize>>, value: i32) -> impl Fn() -> i32 + 'static {
        let counter = Rc::clone(counter);
        move || {
            counter.set(counter.get() + 1);
            value
        }
    }

    #[test]
    fn two_subscribers_compute_once() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));

        let a = ReactiveScope::new();
        let b = ReactiveScope::new();
        assert_eq!(cache.cached("k", Some(&a), counted(&runs, 7)), 7);
        assert_eq!(cache.cached("k", Some(&b), counted(&runs, 7)), 7);

        assert_eq!(runs.get(), 1);
        assert_eq!(cache.subscriber_count(&"k"), 2);
    }

    #[test]
    fn entry_released_when_last_scope_disposes() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));

        let a = ReactiveScope::new();
        let b = ReactiveScope::new();
        cache.cached("k", Some(&a), counted(&runs, 1));
        cache.cached("k", Some(&b), counted(&runs, 1));

        a.dispose();
        assert_eq!(cache.len(), 1);
        b.dispose();
        assert_eq!(cache.len(), 0);

        // A later reactive request recomputes fresh.
        let c = ReactiveScope::new();
        cache.cached("k", Some(&c), counted(&runs, 1));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn double_dispose_is_noop() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));

        let a = ReactiveScope::new();
        let b = ReactiveScope::new();
        cache.cached("k", Some(&a), counted(&runs, 1));
        cache.cached("k", Some(&b), counted(&runs, 1));

        a.dispose();
        a.dispose();
        // b still holds the entry; a's double dispose must not free it.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.subscriber_count(&"k"), 1);
    }

    #[test]
    fn scope_drop_releases() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));
        {
            let scope = ReactiveScope::new();
            cache.cached("k", Some(&scope), counted(&runs, 1));
            assert_eq!(cache.len(), 1);
        }
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn one_off_read_uses_entry_without_subscribing() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));

        let scope = ReactiveScope::new();
        cache.cached("k", Some(&scope), counted(&runs, 5));
        assert_eq!(cache.cached("k", None, counted(&runs, 5)), 5);

        assert_eq!(runs.get(), 1);
        assert_eq!(cache.subscriber_count(&"k"), 1);
    }

    #[test]
    fn one_off_read_never_creates_entry() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));

        assert_eq!(cache.cached("k", None, counted(&runs, 3)), 3);
        assert_eq!(runs.get(), 1);
        assert!(cache.is_empty());

        // And recomputes every time.
        cache.cached("k", None, counted(&runs, 3));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn invalidate_forces_recompute_on_next_access() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));

        let scope = ReactiveScope::new();
        cache.cached("k", Some(&scope), counted(&runs, 9));
        cache.invalidate(&"k");
        assert_eq!(cache.cached("k", None, counted(&runs, 9)), 9);
        assert_eq!(runs.get(), 2);

        // Recomputed value is stored; the next read is a hit.
        cache.cached("k", None, counted(&runs, 9));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn distinct_keys_are_independent() {
        let cache: ReactiveCache<&'static str, i32> = ReactiveCache::new();
        let runs = Rc::new(Cell::new(0));

        let scope = ReactiveScope::new();
        assert_eq!(cache.cached("a", Some(&scope), counted(&runs, 1)), 1);
        assert_eq!(cache.cached("b", Some(&scope), counted(&runs, 2)), 2);
        assert_eq!(runs.get(), 2);
        assert_eq!(cache.len(), 2);

        scope.dispose();
        assert!(cache.is_empty());
    }
}
