use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cospace_common::EntityId;
use cospace_doc::{DocSubscription, DocTxn, Document, PatchBatch, PatchOp};
use cospace_schema::{ComponentRegistry, ComponentValue};
use cospace_world::{
    ChangeBatch, EcsWorld, Provenance, WorldChange, WorldSubscription, WorldTxn,
};
use serde_json::Value;

use crate::layout::{self, ResolvedPath};

/// Process-wide counter handing each projection a distinct origin token.
static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

/// The bidirectional synchronizer between an [`EcsWorld`] and a
/// [`Document`].
///
/// Local world batches become one document transaction each; document
/// batches from other writers are decoded through the registry and applied
/// to the world as one `Replay` transaction. Batches tagged with this
/// projection's own origin are ignored, so replayed mutations never write
/// back into the document.
///
/// [`Projection::attach`] expects a freshly-created world: the document is
/// the authority at attach time and is walked once before patches stream.
pub struct Projection {
    world: Rc<RefCell<EcsWorld>>,
    doc: Rc<Document>,
    world_sub: Option<WorldSubscription>,
    doc_sub: Option<DocSubscription>,
    origin: u64,
}

impl Projection {
    /// Load the document into the world, then mirror changes both ways
    /// until [`Projection::detach`].
    pub fn attach(
        world: Rc<RefCell<EcsWorld>>,
        doc: Rc<Document>,
        registry: Arc<ComponentRegistry>,
    ) -> Self {
        let origin = NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed);
        initial_load(&world, &doc, &registry);

        let doc_sub = {
            let world = Rc::downgrade(&world);
            let registry = Arc::clone(&registry);
            doc.subscribe(move |doc, batch| {
                if batch.origin == Some(origin) {
                    return;
                }
                let Some(world) = world.upgrade() else { return };
                apply_patch_batch(&world, doc, &registry, batch);
            })
        };

        let world_sub = {
            let doc = Rc::downgrade(&doc);
            let registry = Arc::clone(&registry);
            world.borrow_mut().subscribe(move |batch| {
                if batch.provenance != Provenance::Local {
                    return;
                }
                let Some(doc) = doc.upgrade() else { return };
                forward_changes(&doc, &registry, origin, batch);
            })
        };

        Self {
            world,
            doc,
            world_sub: Some(world_sub),
            doc_sub: Some(doc_sub),
            origin,
        }
    }

    /// The origin token this projection stamps on its document writes.
    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Stop mirroring in both directions. Safe to call more than once.
    pub fn detach(&mut self) {
        if let Some(sub) = self.world_sub.take() {
            self.world.borrow_mut().unsubscribe(sub);
        }
        if let Some(sub) = self.doc_sub.take() {
            self.doc.unsubscribe(sub);
        }
    }
}

impl Drop for Projection {
    fn drop(&mut self) {
        self.detach();
    }
}

fn initial_load(world: &RefCell<EcsWorld>, doc: &Document, registry: &ComponentRegistry) {
    let mut world = world.borrow_mut();
    world.transact(Provenance::Replay, |tx| {
        let mut components: Vec<(EntityId, String)> = Vec::new();
        for (path, _) in doc.children(&layout::entities_root()) {
            match layout::resolve(&path) {
                Some(ResolvedPath::Entity(id)) => {
                    tx.create_entity_with_id(id, []);
                }
                Some(ResolvedPath::Component { entity, type_name }) => {
                    if !components
                        .iter()
                        .any(|(e, t)| *e == entity && *t == type_name)
                    {
                        components.push((entity, type_name));
                    }
                }
                None => {}
            }
        }
        for (entity, type_name) in components {
            refresh_component(tx, doc, registry, entity, &type_name);
        }
    });
}

/// Apply one document batch to the world as a single `Replay` transaction.
fn apply_patch_batch(
    world: &RefCell<EcsWorld>,
    doc: &Document,
    registry: &ComponentRegistry,
    batch: &PatchBatch,
) {
    let mut world = world.borrow_mut();
    world.transact(Provenance::Replay, |tx| {
        let mut dirty: Vec<(EntityId, String)> = Vec::new();
        for patch in &batch.patches {
            match layout::resolve(&patch.path) {
                Some(ResolvedPath::Entity(id)) => match patch.op {
                    PatchOp::Insert | PatchOp::Update => {
                        if !tx.contains(id) {
                            tx.create_entity_with_id(id, []);
                        }
                    }
                    PatchOp::Delete => {
                        tx.destroy_entity(id);
                    }
                },
                Some(ResolvedPath::Component { entity, type_name }) => {
                    if !dirty.iter().any(|(e, t)| *e == entity && *t == type_name) {
                        dirty.push((entity, type_name));
                    }
                }
                None => {}
            }
        }
        for (entity, type_name) in dirty {
            refresh_component(tx, doc, registry, entity, &type_name);
        }
    });
}

/// Re-read one component's subtree from the document and mirror the result
/// into the world.
fn refresh_component(
    tx: &mut WorldTxn<'_>,
    doc: &Document,
    registry: &ComponentRegistry,
    entity: EntityId,
    type_name: &str,
) {
    // Entity liveness is marker-authoritative: component leaves under a
    // dead marker stay in the document but are not materialized.
    if doc.read(&layout::entity_path(entity)).is_none() {
        return;
    }
    let root = layout::component_path(entity, type_name);
    let leaves = doc.children(&root);

    let Some(ty) = registry.lookup(type_name) else {
        if !leaves.is_empty() {
            tracing::debug!(%entity, type_name, "unknown component type, raw data kept in document");
        }
        return;
    };

    if leaves.is_empty() {
        tx.remove_component(entity, type_name);
        return;
    }

    let raw = layout::assemble(&root, &leaves);
    match ty.validate(&raw) {
        Ok(value) => {
            if !tx.contains(entity) {
                tx.create_entity_with_id(entity, []);
            }
            let _ = tx.set_component(entity, type_name, value);
        }
        Err(error) => {
            tracing::warn!(%entity, type_name, %error, "skipping component that failed validation");
        }
    }
}

/// Mirror one local world batch into the document as a single transaction.
fn forward_changes(
    doc: &Document,
    registry: &ComponentRegistry,
    origin: u64,
    batch: &ChangeBatch,
) {
    doc.mutate(Some(origin), |tx| {
        for change in &batch.changes {
            match change {
                WorldChange::EntityCreated { entity } => {
                    tx.write(layout::entity_path(*entity), Value::Bool(true));
                }
                WorldChange::EntityDestroyed { entity } => {
                    tx.delete(layout::entity_path(*entity));
                }
                WorldChange::ComponentAdded {
                    entity,
                    type_name,
                    value,
                } => {
                    write_component(tx, registry, *entity, type_name, value.as_ref(), None);
                }
                WorldChange::ComponentChanged {
                    entity,
                    type_name,
                    old,
                    new,
                } => {
                    write_component(
                        tx,
                        registry,
                        *entity,
                        type_name,
                        new.as_ref(),
                        Some(old.as_ref()),
                    );
                }
                WorldChange::ComponentRemoved {
                    entity, type_name, ..
                } => {
                    tx.delete_subtree(&layout::component_path(*entity, type_name));
                }
            }
        }
    });
}

fn write_component(
    tx: &mut DocTxn<'_>,
    registry: &ComponentRegistry,
    entity: EntityId,
    type_name: &str,
    value: &dyn ComponentValue,
    old: Option<&dyn ComponentValue>,
) {
    let Some(ty) = registry.lookup(type_name) else {
        tracing::warn!(%entity, type_name, "component type not registered, change not persisted");
        return;
    };
    let raw = match ty.serialize_value(value) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::error!(%entity, type_name, %error, "component value does not belong to its registered type");
            return;
        }
    };
    let root = layout::component_path(entity, type_name);
    let mut leaves = Vec::new();
    layout::flatten_into(root.clone(), &raw, &mut leaves);

    // Delete leaves the previous shape had and the new one no longer does.
    if let Some(old) = old {
        if let Ok(old_raw) = ty.serialize_value(old) {
            let mut old_leaves = Vec::new();
            layout::flatten_into(root, &old_raw, &mut old_leaves);
            for (path, _) in old_leaves {
                if !leaves.iter().any(|(p, _)| *p == path) {
                    tx.delete(path);
                }
            }
        }
    }
    for (path, value) in leaves {
        tx.write(path, value);
    }
}

/// Serialize the world's components for every registered type, keyed by
/// entity then type name.
pub fn export_world(
    world: &EcsWorld,
    registry: &ComponentRegistry,
) -> BTreeMap<EntityId, BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for id in world.entities() {
        let mut components = BTreeMap::new();
        for name in world.component_names(id) {
            let Some(ty) = registry.lookup(&name) else {
                continue;
            };
            let Some(value) = world.get_component(id, &name) else {
                continue;
            };
            match ty.serialize_value(value.as_ref()) {
                Ok(raw) => {
                    components.insert(name, raw);
                }
                Err(error) => {
                    tracing::error!(entity = %id, type_name = %name, %error, "unserializable component skipped");
                }
            }
        }
        out.insert(id, components);
    }
    out
}

/// Decode the document through the registry: every live entity and every
/// component of a known type that validates. The projection's consistency
/// invariant is that this equals [`export_world`] after any batch.
pub fn decode_document(
    doc: &Document,
    registry: &ComponentRegistry,
) -> BTreeMap<EntityId, BTreeMap<String, Value>> {
    let mut out: BTreeMap<EntityId, BTreeMap<String, Value>> = BTreeMap::new();
    let mut components: Vec<(EntityId, String)> = Vec::new();
    for (path, _) in doc.children(&layout::entities_root()) {
        match layout::resolve(&path) {
            Some(ResolvedPath::Entity(id)) => {
                out.entry(id).or_default();
            }
            Some(ResolvedPath::Component { entity, type_name }) => {
                if !components
                    .iter()
                    .any(|(e, t)| *e == entity && *t == type_name)
                {
                    components.push((entity, type_name));
                }
            }
            None => {}
        }
    }
    for (entity, type_name) in components {
        // Marker-authoritative: skip components of dead entities.
        if !out.contains_key(&entity) {
            continue;
        }
        let Some(ty) = registry.lookup(&type_name) else {
            continue;
        };
        let root = layout::component_path(entity, &type_name);
        let raw = layout::assemble(&root, &doc.children(&root));
        // Validate and re-serialize so the result is shape-normalized.
        if let Ok(value) = ty.validate(&raw) {
            if let Ok(normalized) = ty.serialize_value(value.as_ref()) {
                out.entry(entity).or_default().insert(type_name, normalized);
            }
        }
    }
    out
}
