//! Document layout: how entities and components map to stable paths.
//!
//! - `entities/<id>` holds the entity's liveness marker.
//! - `entities/<id>/<type>/<field...>` holds one register per serialized
//!   leaf field, so concurrent edits to different fields of one component
//!   both survive a merge. Arrays and primitives are single leaves.

use cospace_common::EntityId;
use cospace_doc::DocPath;
use serde_json::{Map, Value};

pub(crate) const ENTITIES: &str = "entities";

/// Root of the entity table.
pub fn entities_root() -> DocPath {
    DocPath::new([ENTITIES])
}

/// Path of an entity's liveness marker.
pub fn entity_path(id: EntityId) -> DocPath {
    DocPath::new([ENTITIES.to_string(), id.to_string()])
}

/// Root path of one component of one entity.
pub fn component_path(id: EntityId, type_name: &str) -> DocPath {
    entity_path(id).child(type_name)
}

/// A document path resolved back to store coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    Entity(EntityId),
    Component {
        entity: EntityId,
        type_name: String,
    },
}

/// Resolve a path back to (entity[, component type]). Paths outside the
/// entity table, or with a malformed id, resolve to `None` and are left
/// alone.
pub fn resolve(path: &DocPath) -> Option<ResolvedPath> {
    let segments = path.segments();
    if segments.first().map(String::as_str) != Some(ENTITIES) {
        return None;
    }
    let entity = EntityId::parse(segments.get(1)?).ok()?;
    match segments.len() {
        2 => Some(ResolvedPath::Entity(entity)),
        _ => Some(ResolvedPath::Component {
            entity,
            type_name: segments[2].clone(),
        }),
    }
}

/// Decompose a serialized component value into per-field leaf registers.
/// Non-empty objects recurse; everything else (primitives, arrays, empty
/// objects) is a single leaf.
pub(crate) fn flatten_into(path: DocPath, value: &Value, out: &mut Vec<(DocPath, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(path.child(key), nested, out);
            }
        }
        other => out.push((path, other.clone())),
    }
}

/// Rebuild a serialized component value from its leaf registers.
pub(crate) fn assemble(root: &DocPath, leaves: &[(DocPath, Value)]) -> Value {
    if let [(path, value)] = leaves {
        if path == root {
            return value.clone();
        }
    }
    let mut obj = Map::new();
    for (path, value) in leaves {
        let relative = &path.segments()[root.len()..];
        if relative.is_empty() {
            // A leaf at the root alongside field leaves can only come from
            // merging a scalar write with a structured one; the structured
            // form wins.
            continue;
        }
        insert_nested(&mut obj, relative, value.clone());
    }
    Value::Object(obj)
}

fn insert_nested(obj: &mut Map<String, Value>, segments: &[String], value: Value) {
    if segments.len() == 1 {
        obj.insert(segments[0].clone(), value);
        return;
    }
    let entry = obj
        .entry(segments[0].clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = entry {
        insert_nested(map, &segments[1..], value);
    }
}
