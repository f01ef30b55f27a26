use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::DocPath;

/// Logical clock stamp ordering concurrent writes.
///
/// Ordered by clock first, then by replica id as a deterministic
/// tie-break, so every replica resolves a conflict the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    pub clock: u64,
    pub replica: u64,
}

/// One last-write-wins cell of the document. `value: None` is a tombstone:
/// the register is dead but its stamp still participates in merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Register {
    pub(crate) value: Option<Value>,
    pub(crate) stamp: Stamp,
}

/// Kind of structural edit delivered in a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Insert,
    Update,
    Delete,
}

/// One structural edit at one path.
#[derive(Debug, Clone)]
pub struct Patch {
    pub path: DocPath,
    pub op: PatchOp,
    /// The new value for inserts and updates, `None` for deletes.
    pub value: Option<Value>,
}

/// An ordered set of edits delivered together: one atomic change to the
/// document. `origin` identifies the local writer that produced the batch,
/// `None` for changes merged in from another replica.
#[derive(Debug, Clone)]
pub struct PatchBatch {
    pub origin: Option<u64>,
    pub patches: Vec<Patch>,
}

/// Serialized register state exchanged between replicas and written to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocUpdate {
    entries: Vec<(DocPath, Register)>,
}

impl DocUpdate {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct DocState {
    registers: BTreeMap<DocPath, Register>,
    clock: u64,
}

/// Handle to an active patch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocSubscription(u64);

type Subscriber = Rc<dyn Fn(&Document, &PatchBatch)>;

/// A mergeable shared document: a flat tree of last-write-wins registers.
///
/// All writes go through [`Document::mutate`], which applies any number of
/// path edits as one transaction and delivers them to subscribers as a
/// single [`PatchBatch`]. Replicas converge by exchanging [`DocUpdate`]s;
/// per-register stamps pick the winner, so merge needs no coordination.
///
/// Subscribers run synchronously after the transaction commits. A
/// subscriber may read the document but must not mutate it.
pub struct Document {
    replica: u64,
    state: RefCell<DocState>,
    subscribers: RefCell<Vec<(u64, Subscriber)>>,
    next_sub: Cell<u64>,
}

impl Document {
    pub fn new(replica: u64) -> Self {
        Self {
            replica,
            state: RefCell::new(DocState {
                registers: BTreeMap::new(),
                clock: 0,
            }),
            subscribers: RefCell::new(Vec::new()),
            next_sub: Cell::new(0),
        }
    }

    /// Rebuild a document from previously exported state.
    pub fn from_update(replica: u64, update: &DocUpdate) -> Self {
        let doc = Self::new(replica);
        doc.apply_update(update);
        doc
    }

    pub fn replica(&self) -> u64 {
        self.replica
    }

    /// Read the live value at a path. Tombstoned and absent paths read as
    /// `None`.
    pub fn read(&self, path: &DocPath) -> Option<Value> {
        self.state
            .borrow()
            .registers
            .get(path)
            .and_then(|r| r.value.clone())
    }

    /// All live leaves at or below `prefix`, in path order.
    pub fn children(&self, prefix: &DocPath) -> Vec<(DocPath, Value)> {
        self.state
            .borrow()
            .registers
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter_map(|(path, reg)| reg.value.clone().map(|v| (path.clone(), v)))
            .collect()
    }

    /// Every live leaf in the document, in path order.
    pub fn snapshot(&self) -> Vec<(DocPath, Value)> {
        self.children(&DocPath::root())
    }

    /// Number of live registers.
    pub fn live_len(&self) -> usize {
        self.state
            .borrow()
            .registers
            .values()
            .filter(|r| r.value.is_some())
            .count()
    }

    /// Apply a set of writes as one atomic transaction.
    ///
    /// Subscribers observe the transaction as a single batch tagged with
    /// `origin`; they never see an intermediate state. Writes that leave a
    /// live register unchanged are dropped.
    pub fn mutate(&self, origin: Option<u64>, f: impl FnOnce(&mut DocTxn<'_>)) {
        let batch = {
            let mut state = self.state.borrow_mut();
            state.clock += 1;
            let stamp = Stamp {
                clock: state.clock,
                replica: self.replica,
            };
            let mut txn = DocTxn {
                state: &mut *state,
                stamp,
                patches: Vec::new(),
            };
            f(&mut txn);
            PatchBatch {
                origin,
                patches: txn.patches,
            }
        };
        if !batch.patches.is_empty() {
            self.dispatch(&batch);
        }
    }

    /// Export the full register state for another replica or for disk.
    pub fn export(&self) -> DocUpdate {
        DocUpdate {
            entries: self
                .state
                .borrow()
                .registers
                .iter()
                .map(|(path, reg)| (path.clone(), reg.clone()))
                .collect(),
        }
    }

    /// Merge previously exported state into this document.
    ///
    /// For each register the stamp picks the winner; adopted changes are
    /// delivered to subscribers as one batch with no origin. Applying the
    /// same update twice is a no-op.
    pub fn apply_update(&self, update: &DocUpdate) {
        let batch = {
            let mut state = self.state.borrow_mut();
            let mut patches = Vec::new();
            for (path, incoming) in &update.entries {
                state.clock = state.clock.max(incoming.stamp.clock);
                let current = state.registers.get(path);
                let adopt = match current {
                    None => true,
                    Some(cur) => incoming.stamp > cur.stamp,
                };
                if !adopt {
                    continue;
                }
                let was_live = current.is_some_and(|r| r.value.is_some());
                let value_changed =
                    current.and_then(|r| r.value.as_ref()) != incoming.value.as_ref();
                state.registers.insert(path.clone(), incoming.clone());
                let op = match (was_live, incoming.value.is_some()) {
                    (false, true) => PatchOp::Insert,
                    (true, true) => PatchOp::Update,
                    (true, false) => PatchOp::Delete,
                    // Tombstone replacing a tombstone: stamp bookkeeping only.
                    (false, false) => continue,
                };
                if op == PatchOp::Update && !value_changed {
                    continue;
                }
                patches.push(Patch {
                    path: path.clone(),
                    op,
                    value: incoming.value.clone(),
                });
            }
            PatchBatch {
                origin: None,
                patches,
            }
        };
        if !batch.patches.is_empty() {
            self.dispatch(&batch);
        }
    }

    /// Merge another in-process document's state into this one.
    pub fn merge_from(&self, other: &Document) {
        self.apply_update(&other.export());
    }

    /// Register a patch subscriber. The callback runs once per committed
    /// batch, after the batch is fully applied.
    pub fn subscribe(&self, f: impl Fn(&Document, &PatchBatch) + 'static) -> DocSubscription {
        let id = self.next_sub.get();
        self.next_sub.set(id + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(f)));
        DocSubscription(id)
    }

    /// Remove a subscriber. Unknown handles are ignored.
    pub fn unsubscribe(&self, sub: DocSubscription) {
        self.subscribers.borrow_mut().retain(|(id, _)| *id != sub.0);
    }

    fn dispatch(&self, batch: &PatchBatch) {
        let subs: Vec<Subscriber> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| Rc::clone(f))
            .collect();
        for f in subs {
            f(self, batch);
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Document")
            .field("replica", &self.replica)
            .field("clock", &state.clock)
            .field("registers", &state.registers.len())
            .finish()
    }
}

/// Write access to the document within one transaction.
pub struct DocTxn<'a> {
    state: &'a mut DocState,
    stamp: Stamp,
    patches: Vec<Patch>,
}

impl DocTxn<'_> {
    /// Set the value at a path. Writing the value already present is a
    /// no-op and produces no patch.
    pub fn write(&mut self, path: DocPath, value: Value) {
        let current = self.state.registers.get(&path).and_then(|r| r.value.as_ref());
        if current == Some(&value) {
            return;
        }
        let op = if current.is_some() {
            PatchOp::Update
        } else {
            PatchOp::Insert
        };
        self.state.registers.insert(
            path.clone(),
            Register {
                value: Some(value.clone()),
                stamp: self.stamp,
            },
        );
        self.patches.push(Patch {
            path,
            op,
            value: Some(value),
        });
    }

    /// Tombstone the register at a path. Deleting a dead or absent path is
    /// a no-op.
    pub fn delete(&mut self, path: DocPath) {
        let live = self
            .state
            .registers
            .get(&path)
            .is_some_and(|r| r.value.is_some());
        if !live {
            return;
        }
        self.state.registers.insert(
            path.clone(),
            Register {
                value: None,
                stamp: self.stamp,
            },
        );
        self.patches.push(Patch {
            path,
            op: PatchOp::Delete,
            value: None,
        });
    }

    /// Tombstone every live register at or below `prefix`.
    pub fn delete_subtree(&mut self, prefix: &DocPath) {
        let targets: Vec<DocPath> = self
            .state
            .registers
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter(|(_, reg)| reg.value.is_some())
            .map(|(path, _)| path.clone())
            .collect();
        for path in targets {
            self.delete(path);
        }
    }

    /// Read a value as of this transaction, own writes included.
    pub fn read(&self, path: &DocPath) -> Option<&Value> {
        self.state.registers.get(path).and_then(|r| r.value.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn p(segments: &[&str]) -> DocPath {
        DocPath::new(segments.iter().copied())
    }

    #[test]
    fn write_read_delete() {
        let doc = Document::new(1);
        doc.mutate(None, |tx| tx.write(p(&["a", "b"]), json!(1)));
        assert_eq!(doc.read(&p(&["a", "b"])), Some(json!(1)));

        doc.mutate(None, |tx| tx.delete(p(&["a", "b"])));
        assert_eq!(doc.read(&p(&["a", "b"])), None);
    }

    #[test]
    fn batch_carries_ops_in_order() {
        let doc = Document::new(1);
        let seen: Rc<RefCell<Vec<PatchBatch>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        doc.subscribe(move |_, batch| sink.borrow_mut().push(batch.clone()));

        doc.mutate(Some(7), |tx| {
            tx.write(p(&["x"]), json!(1));
            tx.write(p(&["y"]), json!(2));
        });
        doc.mutate(Some(7), |tx| {
            tx.write(p(&["x"]), json!(10));
            tx.delete(p(&["y"]));
        });

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].origin, Some(7));
        assert_eq!(seen[0].patches.len(), 2);
        assert_eq!(seen[0].patches[0].op, PatchOp::Insert);
        assert_eq!(seen[1].patches[0].op, PatchOp::Update);
        assert_eq!(seen[1].patches[1].op, PatchOp::Delete);
    }

    #[test]
    fn noop_write_produces_no_batch() {
        let doc = Document::new(1);
        doc.mutate(None, |tx| tx.write(p(&["x"]), json!(5)));

        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        doc.subscribe(move |_, _| sink.set(sink.get() + 1));

        doc.mutate(None, |tx| tx.write(p(&["x"]), json!(5)));
        doc.mutate(None, |tx| tx.delete(p(&["never-existed"])));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn children_scans_subtree_only() {
        let doc = Document::new(1);
        doc.mutate(None, |tx| {
            tx.write(p(&["e", "1", "t", "x"]), json!(1));
            tx.write(p(&["e", "1", "t", "y"]), json!(2));
            tx.write(p(&["e", "2", "t", "x"]), json!(3));
        });
        let kids = doc.children(&p(&["e", "1"]));
        assert_eq!(kids.len(), 2);
        assert!(kids.iter().all(|(path, _)| path.starts_with(&p(&["e", "1"]))));
    }

    #[test]
    fn delete_subtree_tombstones_all() {
        let doc = Document::new(1);
        doc.mutate(None, |tx| {
            tx.write(p(&["e", "1", "a"]), json!(1));
            tx.write(p(&["e", "1", "b"]), json!(2));
            tx.write(p(&["e", "2"]), json!(3));
        });
        doc.mutate(None, |tx| tx.delete_subtree(&p(&["e", "1"])));
        assert!(doc.children(&p(&["e", "1"])).is_empty());
        assert_eq!(doc.read(&p(&["e", "2"])), Some(json!(3)));
    }

    #[test]
    fn newer_stamp_wins_merge() {
        let a = Document::new(1);
        let b = Document::new(2);

        a.mutate(None, |tx| tx.write(p(&["k"]), json!("from a")));
        // b's clock advances past a's before writing, so b's write is newer.
        b.apply_update(&a.export());
        b.mutate(None, |tx| tx.write(p(&["k"]), json!("from b")));

        a.apply_update(&b.export());
        assert_eq!(a.read(&p(&["k"])), Some(json!("from b")));
        assert_eq!(b.read(&p(&["k"])), Some(json!("from b")));
    }

    #[test]
    fn concurrent_writes_tie_break_on_replica() {
        let a = Document::new(1);
        let b = Document::new(2);
        // Same clock on both sides: the higher replica id wins everywhere.
        a.mutate(None, |tx| tx.write(p(&["k"]), json!("a")));
        b.mutate(None, |tx| tx.write(p(&["k"]), json!("b")));

        a.merge_from(&b);
        b.merge_from(&a);
        assert_eq!(a.read(&p(&["k"])), Some(json!("b")));
        assert_eq!(b.read(&p(&["k"])), Some(json!("b")));
    }

    #[test]
    fn disjoint_edits_converge_both_ways() {
        let a = Document::new(1);
        let b = Document::new(2);
        a.mutate(None, |tx| tx.write(p(&["left"]), json!(1)));
        b.mutate(None, |tx| tx.write(p(&["right"]), json!(2)));

        a.merge_from(&b);
        b.merge_from(&a);

        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.live_len(), 2);
    }

    #[test]
    fn delete_survives_merge() {
        let a = Document::new(1);
        let b = Document::new(2);
        a.mutate(None, |tx| tx.write(p(&["k"]), json!(1)));
        b.merge_from(&a);
        b.mutate(None, |tx| tx.delete(p(&["k"])));

        a.merge_from(&b);
        assert_eq!(a.read(&p(&["k"])), None);
        // The tombstone still merges over a stale copy.
        let stale = Document::new(3);
        stale.apply_update(&a.export());
        assert_eq!(stale.read(&p(&["k"])), None);
    }

    #[test]
    fn apply_update_is_idempotent() {
        let a = Document::new(1);
        a.mutate(None, |tx| tx.write(p(&["k"]), json!(1)));
        let update = a.export();

        let b = Document::new(2);
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        b.subscribe(move |_, batch| sink.set(sink.get() + batch.patches.len()));

        b.apply_update(&update);
        b.apply_update(&update);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let doc = Document::new(1);
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        let sub = doc.subscribe(move |_, _| sink.set(sink.get() + 1));

        doc.mutate(None, |tx| tx.write(p(&["a"]), json!(1)));
        doc.unsubscribe(sub);
        doc.unsubscribe(sub);
        doc.mutate(None, |tx| tx.write(p(&["b"]), json!(2)));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscriber_can_read_during_dispatch() {
        let doc = Rc::new(Document::new(1));
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        doc.subscribe(move |doc, _| {
            *sink.borrow_mut() = doc.read(&DocPath::new(["k"]));
        });
        doc.mutate(None, |tx| tx.write(DocPath::new(["k"]), json!(9)));
        assert_eq!(*seen.borrow(), Some(json!(9)));
    }
}
