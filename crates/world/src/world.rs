use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use cospace_common::EntityId;
use cospace_schema::ComponentValue;

/// Who initiated a mutation: local user code, or replay of remote patches.
///
/// Carried on every committed batch so the document projection can forward
/// local changes without re-emitting replayed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Local,
    Replay,
}

/// One change applied to the store, with enough payload that subscribers
/// never need to read the world back during notification.
#[derive(Debug, Clone)]
pub enum WorldChange {
    EntityCreated {
        entity: EntityId,
    },
    EntityDestroyed {
        entity: EntityId,
    },
    ComponentAdded {
        entity: EntityId,
        type_name: String,
        value: Arc<dyn ComponentValue>,
    },
    ComponentChanged {
        entity: EntityId,
        type_name: String,
        old: Arc<dyn ComponentValue>,
        new: Arc<dyn ComponentValue>,
    },
    ComponentRemoved {
        entity: EntityId,
        type_name: String,
        value: Arc<dyn ComponentValue>,
    },
}

/// All changes committed by one logical operation, delivered to
/// subscribers as a unit.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub provenance: Provenance,
    pub changes: Vec<WorldChange>,
}

/// Errors from world mutations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
}

/// Handle to an active world subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldSubscription(u64);

type Subscriber = Rc<dyn Fn(&ChangeBatch)>;

#[derive(Default)]
struct EntityRecord {
    components: BTreeMap<String, Arc<dyn ComponentValue>>,
}

/// The entity-component store: the source of truth for queries.
///
/// Every mutation carries a [`Provenance`] and commits as a [`ChangeBatch`],
/// either one batch per operation or grouped via [`EcsWorld::transact`].
/// Subscribers run synchronously once per committed batch, after the batch
/// is fully applied; a subscriber must consume the batch payload and must
/// not call back into this world.
pub struct EcsWorld {
    entities: BTreeMap<EntityId, EntityRecord>,
    /// Entity ids in creation order; queries iterate this.
    order: Vec<EntityId>,
    subscribers: Vec<(u64, Subscriber)>,
    next_sub: u64,
}

impl EcsWorld {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            order: Vec::new(),
            subscribers: Vec::new(),
            next_sub: 0,
        }
    }

    pub fn entity_count(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Entity ids in creation order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter().copied()
    }

    pub fn get_component(&self, id: EntityId, type_name: &str) -> Option<Arc<dyn ComponentValue>> {
        self.entities
            .get(&id)?
            .components
            .get(type_name)
            .map(Arc::clone)
    }

    /// Typed component read; `None` if the entity, component, or downcast
    /// is absent.
    pub fn get_as<T: Clone + 'static>(&self, id: EntityId, type_name: &str) -> Option<T> {
        let value = self.get_component(id, type_name)?;
        value.as_any().downcast_ref::<T>().cloned()
    }

    /// Type names attached to an entity, in name order.
    pub fn component_names(&self, id: EntityId) -> Vec<String> {
        self.entities
            .get(&id)
            .map(|record| record.components.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Entities holding all the given component types, in creation order.
    /// The order is stable across calls absent further mutation.
    pub fn query(&self, required: &[&str]) -> Vec<EntityId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                let record = &self.entities[id];
                required
                    .iter()
                    .all(|name| record.components.contains_key(*name))
            })
            .collect()
    }

    /// Register a change subscriber.
    pub fn subscribe(&mut self, f: impl Fn(&ChangeBatch) + 'static) -> WorldSubscription {
        let id = self.next_sub;
        self.next_sub += 1;
        self.subscribers.push((id, Rc::new(f)));
        WorldSubscription(id)
    }

    /// Remove a subscriber. Unknown handles are ignored.
    pub fn unsubscribe(&mut self, sub: WorldSubscription) {
        self.subscribers.retain(|(id, _)| *id != sub.0);
    }

    /// Group several mutations into one committed batch.
    pub fn transact<R>(
        &mut self,
        provenance: Provenance,
        f: impl FnOnce(&mut WorldTxn<'_>) -> R,
    ) -> R {
        let mut txn = WorldTxn {
            world: self,
            changes: Vec::new(),
        };
        let out = f(&mut txn);
        let changes = std::mem::take(&mut txn.changes);
        if !changes.is_empty() {
            self.dispatch(ChangeBatch {
                provenance,
                changes,
            });
        }
        out
    }

    /// Create an entity with a fresh id and the given initial components.
    pub fn create_entity(
        &mut self,
        provenance: Provenance,
        initial: impl IntoIterator<Item = (String, Arc<dyn ComponentValue>)>,
    ) -> EntityId {
        let id = EntityId::new();
        self.transact(provenance, |tx| tx.create_entity_with_id(id, initial));
        id
    }

    /// Create an entity under a caller-chosen id (replay and tests).
    pub fn create_entity_with_id(
        &mut self,
        provenance: Provenance,
        id: EntityId,
        initial: impl IntoIterator<Item = (String, Arc<dyn ComponentValue>)>,
    ) {
        self.transact(provenance, |tx| tx.create_entity_with_id(id, initial));
    }

    /// Remove an entity and all its components as one atomic operation.
    /// Returns `false` if the entity was absent.
    pub fn destroy_entity(&mut self, provenance: Provenance, id: EntityId) -> bool {
        self.transact(provenance, |tx| tx.destroy_entity(id))
    }

    /// Attach or replace a component. Setting an equal value is a no-op.
    pub fn set_component(
        &mut self,
        provenance: Provenance,
        id: EntityId,
        type_name: &str,
        value: Arc<dyn ComponentValue>,
    ) -> Result<(), WorldError> {
        self.transact(provenance, |tx| tx.set_component(id, type_name, value))
    }

    /// Typed convenience for [`EcsWorld::set_component`].
    pub fn set<T>(
        &mut self,
        provenance: Provenance,
        id: EntityId,
        type_name: &str,
        value: T,
    ) -> Result<(), WorldError>
    where
        T: Any + fmt::Debug + PartialEq,
    {
        self.set_component(provenance, id, type_name, Arc::new(value))
    }

    /// Detach a component. Returns `false` if the entity or component was
    /// absent.
    pub fn remove_component(
        &mut self,
        provenance: Provenance,
        id: EntityId,
        type_name: &str,
    ) -> bool {
        self.transact(provenance, |tx| tx.remove_component(id, type_name))
    }

    fn dispatch(&mut self, batch: ChangeBatch) {
        if self.subscribers.is_empty() {
            return;
        }
        tracing::trace!(
            provenance = ?batch.provenance,
            changes = batch.changes.len(),
            "world batch committed"
        );
        let subs: Vec<Subscriber> = self.subscribers.iter().map(|(_, f)| Rc::clone(f)).collect();
        for f in subs {
            f(&batch);
        }
    }
}

impl Default for EcsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EcsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcsWorld")
            .field("entities", &self.order.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Convenience for building `(type name, value)` pairs.
pub fn component<T>(name: impl Into<String>, value: T) -> (String, Arc<dyn ComponentValue>)
where
    T: Any + fmt::Debug + PartialEq,
{
    (name.into(), Arc::new(value))
}

/// Mutation access to the world within one transaction.
pub struct WorldTxn<'a> {
    world: &'a mut EcsWorld,
    changes: Vec<WorldChange>,
}

impl WorldTxn<'_> {
    pub fn contains(&self, id: EntityId) -> bool {
        self.world.contains(id)
    }

    pub fn create_entity_with_id(
        &mut self,
        id: EntityId,
        initial: impl IntoIterator<Item = (String, Arc<dyn ComponentValue>)>,
    ) {
        if self.world.contains(id) {
            return;
        }
        self.world.entities.insert(id, EntityRecord::default());
        self.world.order.push(id);
        self.changes.push(WorldChange::EntityCreated { entity: id });
        for (type_name, value) in initial {
            // Entity exists by construction; the error path is unreachable.
            let _ = self.set_component(id, &type_name, value);
        }
    }

    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        let Some(record) = self.world.entities.remove(&id) else {
            return false;
        };
        self.world.order.retain(|e| *e != id);
        for (type_name, value) in record.components {
            self.changes.push(WorldChange::ComponentRemoved {
                entity: id,
                type_name,
                value,
            });
        }
        self.changes.push(WorldChange::EntityDestroyed { entity: id });
        true
    }

    pub fn set_component(
        &mut self,
        id: EntityId,
        type_name: &str,
        value: Arc<dyn ComponentValue>,
    ) -> Result<(), WorldError> {
        let record = self
            .world
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        match record.components.get(type_name) {
            Some(old) if old.eq_value(value.as_ref()) => Ok(()),
            Some(old) => {
                let old = Arc::clone(old);
                record
                    .components
                    .insert(type_name.to_string(), Arc::clone(&value));
                self.changes.push(WorldChange::ComponentChanged {
                    entity: id,
                    type_name: type_name.to_string(),
                    old,
                    new: value,
                });
                Ok(())
            }
            None => {
                record
                    .components
                    .insert(type_name.to_string(), Arc::clone(&value));
                self.changes.push(WorldChange::ComponentAdded {
                    entity: id,
                    type_name: type_name.to_string(),
                    value,
                });
                Ok(())
            }
        }
    }

    pub fn remove_component(&mut self, id: EntityId, type_name: &str) -> bool {
        let Some(record) = self.world.entities.get_mut(&id) else {
            return false;
        };
        let Some(value) = record.components.remove(type_name) else {
            return false;
        };
        self.changes.push(WorldChange::ComponentRemoved {
            entity: id,
            type_name: type_name.to_string(),
            value,
        });
        true
    }
}
