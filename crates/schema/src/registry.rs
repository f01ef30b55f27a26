use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::schema::{Schema, SchemaError};

/// A dynamically typed component value held by the store.
///
/// Implemented automatically for any `Any + Debug + PartialEq` type, which
/// lets heterogeneous component values share one storage while remaining
/// comparable and downcastable.
pub trait ComponentValue: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_value(&self, other: &dyn ComponentValue) -> bool;
}

impl<T: Any + fmt::Debug + PartialEq> ComponentValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn ComponentValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|o| self == o)
    }
}

trait ErasedCodec {
    fn validate(&self, raw: &Value) -> Result<Arc<dyn ComponentValue>, SchemaError>;
    fn serialize(&self, value: &dyn ComponentValue) -> Result<Value, SchemaError>;
}

struct TypedCodec<S> {
    type_name: String,
    schema: S,
}

impl<S> ErasedCodec for TypedCodec<S>
where
    S: Schema,
    S::Value: Any + fmt::Debug + PartialEq,
{
    fn validate(&self, raw: &Value) -> Result<Arc<dyn ComponentValue>, SchemaError> {
        Ok(Arc::new(self.schema.validate(raw)?))
    }

    fn serialize(&self, value: &dyn ComponentValue) -> Result<Value, SchemaError> {
        let typed = value
            .as_any()
            .downcast_ref::<S::Value>()
            .ok_or_else(|| SchemaError::WrongValueType {
                type_name: self.type_name.clone(),
            })?;
        Ok(self.schema.serialize(typed))
    }
}

/// A named component kind: a stable type name paired with its codec.
///
/// The codec is the only serialization contract between store values and
/// document data; no other code may assume a component's in-memory shape
/// matches its persisted shape.
#[derive(Clone)]
pub struct ComponentType {
    name: String,
    codec: Arc<dyn ErasedCodec>,
}

impl ComponentType {
    pub fn new<S>(name: impl Into<String>, schema: S) -> Self
    where
        S: Schema + 'static,
        S::Value: Any + fmt::Debug + PartialEq,
    {
        let name = name.into();
        Self {
            codec: Arc::new(TypedCodec {
                type_name: name.clone(),
                schema,
            }),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate raw document data into a store value.
    pub fn validate(&self, raw: &Value) -> Result<Arc<dyn ComponentValue>, SchemaError> {
        self.codec.validate(raw)
    }

    /// Serialize a store value back into raw document data.
    ///
    /// Fails only if the value's dynamic type does not belong to this
    /// component type, which indicates a programming error.
    pub fn serialize_value(&self, value: &dyn ComponentValue) -> Result<Value, SchemaError> {
        self.codec.serialize(value)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .finish()
    }
}

/// Error from registering a component type.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A type of this name is already registered. Registration happens at
    /// startup; a duplicate is a programming error, not a runtime state.
    #[error("component type `{0}` is already registered")]
    DuplicateType(String),
}

/// Runtime table of known component types, keyed by name.
///
/// Lookup by an unknown name is not an error: callers skip the component
/// and leave its raw data untouched, which is what lets older builds load
/// documents written by newer ones.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    types: BTreeMap<String, ComponentType>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: ComponentType) -> Result<(), RegistryError> {
        if self.types.contains_key(ty.name()) {
            return Err(RegistryError::DuplicateType(ty.name().to_string()));
        }
        self.types.insert(ty.name().to_string(), ty);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ComponentType> {
        self.types.get(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
