use serde_json::Value;

/// Errors from validating raw document data against a schema.
///
/// Structural errors carry the field path at which validation failed,
/// built up as the error propagates out of nested combinators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The raw value's shape does not match what the schema expects.
    #[error("expected {expected}, found {found}{}", fmt_path(.path))]
    Shape {
        expected: &'static str,
        found: &'static str,
        path: String,
    },
    /// A required object field is absent.
    #[error("missing field `{path}`")]
    MissingField { path: String },
    /// A stored value was handed to the codec of a different component type.
    #[error("value is not a `{type_name}` component")]
    WrongValueType { type_name: String },
}

fn fmt_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at `{path}`")
    }
}

fn value_kind(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl SchemaError {
    fn shape(expected: &'static str, raw: &Value) -> Self {
        Self::Shape {
            expected,
            found: value_kind(raw),
            path: String::new(),
        }
    }

    /// Prefix the error's field path with an enclosing segment.
    pub fn under(mut self, segment: &str) -> Self {
        match &mut self {
            Self::Shape { path, .. } | Self::MissingField { path } => {
                *path = if path.is_empty() {
                    segment.to_string()
                } else {
                    format!("{segment}.{path}")
                };
            }
            Self::WrongValueType { .. } => {}
        }
        self
    }
}

/// A self-describing codec between raw document data and a typed value.
///
/// `validate` turns untyped data into the typed value or fails with the
/// field path of the first mismatch. `serialize` is total. For every value
/// accepted by `validate`, serializing and validating again yields an
/// equal value.
pub trait Schema {
    type Value;

    fn validate(&self, raw: &Value) -> Result<Self::Value, SchemaError>;
    fn serialize(&self, value: &Self::Value) -> Value;
}

/// Schema for a JSON number, decoded as `f64`.
pub struct NumberSchema;

/// Schema accepting any JSON number.
pub fn number() -> NumberSchema {
    NumberSchema
}

impl Schema for NumberSchema {
    type Value = f64;

    fn validate(&self, raw: &Value) -> Result<f64, SchemaError> {
        raw.as_f64().ok_or_else(|| SchemaError::shape("number", raw))
    }

    fn serialize(&self, value: &f64) -> Value {
        Value::from(*value)
    }
}

/// Schema for a JSON string.
pub struct TextSchema;

pub fn text() -> TextSchema {
    TextSchema
}

impl Schema for TextSchema {
    type Value = String;

    fn validate(&self, raw: &Value) -> Result<String, SchemaError> {
        raw.as_str()
            .map(str::to_string)
            .ok_or_else(|| SchemaError::shape("string", raw))
    }

    fn serialize(&self, value: &String) -> Value {
        Value::String(value.clone())
    }
}

/// Schema for a JSON boolean.
pub struct BoolSchema;

pub fn boolean() -> BoolSchema {
    BoolSchema
}

impl Schema for BoolSchema {
    type Value = bool;

    fn validate(&self, raw: &Value) -> Result<bool, SchemaError> {
        raw.as_bool().ok_or_else(|| SchemaError::shape("boolean", raw))
    }

    fn serialize(&self, value: &bool) -> Value {
        Value::Bool(*value)
    }
}

/// Schema for a homogeneous array, validated member-wise.
pub struct SeqSchema<S> {
    element: S,
}

pub fn seq<S: Schema>(element: S) -> SeqSchema<S> {
    SeqSchema { element }
}

impl<S: Schema> Schema for SeqSchema<S> {
    type Value = Vec<S::Value>;

    fn validate(&self, raw: &Value) -> Result<Vec<S::Value>, SchemaError> {
        let items = raw
            .as_array()
            .ok_or_else(|| SchemaError::shape("array", raw))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.element
                    .validate(item)
                    .map_err(|e| e.under(&i.to_string()))
            })
            .collect()
    }

    fn serialize(&self, value: &Vec<S::Value>) -> Value {
        Value::Array(value.iter().map(|v| self.element.serialize(v)).collect())
    }
}

fn field<S: Schema>(
    obj: &serde_json::Map<String, Value>,
    name: &str,
    schema: &S,
) -> Result<S::Value, SchemaError> {
    let raw = obj.get(name).ok_or_else(|| SchemaError::MissingField {
        path: name.to_string(),
    })?;
    schema.validate(raw).map_err(|e| e.under(name))
}

fn as_object(raw: &Value) -> Result<&serde_json::Map<String, Value>, SchemaError> {
    raw.as_object().ok_or_else(|| SchemaError::shape("object", raw))
}

/// Schema for an object with one required field. Extra fields are ignored.
pub struct Object1<A> {
    name0: String,
    s0: A,
}

pub fn object1<A: Schema>(name0: impl Into<String>, s0: A) -> Object1<A> {
    Object1 {
        name0: name0.into(),
        s0,
    }
}

impl<A: Schema> Schema for Object1<A> {
    type Value = A::Value;

    fn validate(&self, raw: &Value) -> Result<Self::Value, SchemaError> {
        let obj = as_object(raw)?;
        field(obj, &self.name0, &self.s0)
    }

    fn serialize(&self, value: &Self::Value) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert(self.name0.clone(), self.s0.serialize(value));
        Value::Object(obj)
    }
}

/// Schema for an object with two required fields. Extra fields are ignored.
pub struct Object2<A, B> {
    name0: String,
    s0: A,
    name1: String,
    s1: B,
}

pub fn object2<A: Schema, B: Schema>(
    name0: impl Into<String>,
    s0: A,
    name1: impl Into<String>,
    s1: B,
) -> Object2<A, B> {
    Object2 {
        name0: name0.into(),
        s0,
        name1: name1.into(),
        s1,
    }
}

impl<A: Schema, B: Schema> Schema for Object2<A, B> {
    type Value = (A::Value, B::Value);

    fn validate(&self, raw: &Value) -> Result<Self::Value, SchemaError> {
        let obj = as_object(raw)?;
        Ok((
            field(obj, &self.name0, &self.s0)?,
            field(obj, &self.name1, &self.s1)?,
        ))
    }

    fn serialize(&self, value: &Self::Value) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert(self.name0.clone(), self.s0.serialize(&value.0));
        obj.insert(self.name1.clone(), self.s1.serialize(&value.1));
        Value::Object(obj)
    }
}

/// Schema for an object with three required fields. Extra fields are ignored.
pub struct Object3<A, B, C> {
    name0: String,
    s0: A,
    name1: String,
    s1: B,
    name2: String,
    s2: C,
}

pub fn object3<A: Schema, B: Schema, C: Schema>(
    name0: impl Into<String>,
    s0: A,
    name1: impl Into<String>,
    s1: B,
    name2: impl Into<String>,
    s2: C,
) -> Object3<A, B, C> {
    Object3 {
        name0: name0.into(),
        s0,
        name1: name1.into(),
        s1,
        name2: name2.into(),
        s2,
    }
}

impl<A: Schema, B: Schema, C: Schema> Schema for Object3<A, B, C> {
    type Value = (A::Value, B::Value, C::Value);

    fn validate(&self, raw: &Value) -> Result<Self::Value, SchemaError> {
        let obj = as_object(raw)?;
        Ok((
            field(obj, &self.name0, &self.s0)?,
            field(obj, &self.name1, &self.s1)?,
            field(obj, &self.name2, &self.s2)?,
        ))
    }

    fn serialize(&self, value: &Self::Value) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert(self.name0.clone(), self.s0.serialize(&value.0));
        obj.insert(self.name1.clone(), self.s1.serialize(&value.1));
        obj.insert(self.name2.clone(), self.s2.serialize(&value.2));
        Value::Object(obj)
    }
}

/// Bijective wrapper mapping an inner schema's value to an application
/// type through a pair of total conversion functions.
///
/// Performs no validation beyond the inner schema.
pub struct Mapped<S, T, D, E> {
    inner: S,
    decode: D,
    encode: E,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<S, T, D, E> Schema for Mapped<S, T, D, E>
where
    S: Schema,
    D: Fn(S::Value) -> T,
    E: Fn(&T) -> S::Value,
{
    type Value = T;

    fn validate(&self, raw: &Value) -> Result<T, SchemaError> {
        self.inner.validate(raw).map(&self.decode)
    }

    fn serialize(&self, value: &T) -> Value {
        self.inner.serialize(&(self.encode)(value))
    }
}

/// Combinator extensions available on every schema.
pub trait SchemaExt: Schema + Sized {
    /// Wrap this schema with a total conversion pair to and from an
    /// application-level value.
    fn map<T, D, E>(self, decode: D, encode: E) -> Mapped<Self, T, D, E>
    where
        D: Fn(Self::Value) -> T,
        E: Fn(&T) -> Self::Value,
    {
        Mapped {
            inner: self,
            decode,
            encode,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<S: Schema> SchemaExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_accepts_and_rejects() {
        assert_eq!(number().validate(&json!(1.5)).unwrap(), 1.5);
        assert_eq!(number().validate(&json!(3)).unwrap(), 3.0);
        let err = number().validate(&json!("nope")).unwrap_err();
        assert_eq!(
            err,
            SchemaError::Shape {
                expected: "number",
                found: "string",
                path: String::new(),
            }
        );
    }

    #[test]
    fn text_and_boolean_roundtrip() {
        let s = text();
        let v = s.validate(&json!("hello")).unwrap();
        assert_eq!(s.validate(&s.serialize(&v)).unwrap(), v);

        let b = boolean();
        let v = b.validate(&json!(true)).unwrap();
        assert_eq!(b.validate(&b.serialize(&v)).unwrap(), v);
    }

    #[test]
    fn seq_carries_element_index_in_path() {
        let s = seq(number());
        assert_eq!(s.validate(&json!([1, 2, 3])).unwrap(), vec![1.0, 2.0, 3.0]);
        let err = s.validate(&json!([1, "x", 3])).unwrap_err();
        assert!(err.to_string().contains("`1`"), "got: {err}");
    }

    #[test]
    fn object_missing_field_names_path() {
        let s = object2("x", number(), "y", number());
        let err = s.validate(&json!({ "x": 1 })).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                path: "y".to_string()
            }
        );
    }

    #[test]
    fn nested_object_error_path_is_dotted() {
        let s = object1("origin", object2("x", number(), "y", number()));
        let err = s.validate(&json!({ "origin": { "x": 1, "y": "bad" } })).unwrap_err();
        assert!(err.to_string().contains("`origin.y`"), "got: {err}");
    }

    #[test]
    fn object_tolerates_extra_fields() {
        let s = object1("x", number());
        assert_eq!(s.validate(&json!({ "x": 1, "later": true })).unwrap(), 1.0);
    }

    #[test]
    fn mapped_roundtrips_through_inner() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Point {
            x: f64,
            y: f64,
        }
        let s = object2("x", number(), "y", number())
            .map(|(x, y)| Point { x, y }, |p| (p.x, p.y));

        let p = s.validate(&json!({ "x": 1.0, "y": 2.0 })).unwrap();
        assert_eq!(p, Point { x: 1.0, y: 2.0 });
        assert_eq!(s.validate(&s.serialize(&p)).unwrap(), p);
    }

    #[test]
    fn object3_roundtrip() {
        let s = object3("a", number(), "b", text(), "c", boolean());
        let v = s
            .validate(&json!({ "a": 1, "b": "two", "c": false }))
            .unwrap();
        assert_eq!(v, (1.0, "two".to_string(), false));
        assert_eq!(s.validate(&s.serialize(&v)).unwrap(), v);
    }
}
