//! Runtime value graph walked by the serializer.
//!
//! Handlers return a `Value`; typed records take part through the [`Entity`]
//! trait so that only their annotated fields reach the wire.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identity of an entity or controller type in the annotation side table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(&'static str);

impl TypeKey {
    /// Type identity derived from the Rust type name.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(std::any::type_name::<T>())
    }

    /// Type identity for runtime-defined types (e.g. rows loaded by table name).
    pub const fn named(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A schema-bearing object.
///
/// The serializer asks the schema registry which fields of `type_key()` are
/// exposed, then reads each of them through `field()`.
pub trait Entity: Send + Sync + fmt::Debug {
    fn type_key(&self) -> TypeKey;

    /// Returns the field value, or [`Value::Undefined`] when the entity has no such field.
    fn field(&self, name: &str) -> Value;
}

/// A node of the value graph.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    /// A plain bag without a declared schema: every key is serialized.
    Object(BTreeMap<String, Value>),
    Entity(Arc<dyn Entity>),
    /// Something the serializer does not know how to encode (carries its type name).
    Opaque(&'static str),
}

impl Value {
    pub fn entity<E: Entity + 'static>(entity: E) -> Self {
        Value::Entity(Arc::new(entity))
    }

    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Looks up `key` on an object, entity or array holder.
    pub fn member(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
            Value::Entity(entity) => entity.field(key),
            Value::Array(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx).cloned())
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Runtime type name used in serializer diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Entity(entity) => entity.type_key().name(),
            Value::Opaque(name) => name,
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        // NaN and infinities have no JSON form.
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Arc<dyn Entity>> for Value {
    fn from(value: Arc<dyn Entity>) -> Self {
        Value::Entity(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

/// Stringifies a request parameter for constraint evaluation.
///
/// Absent and null parameters become `""`; `0` stays `"0"`.
pub fn to_param_string(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => number_string(n),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| to_param_string(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(JsonValue::Object(_)) => "[object Object]".to_string(),
    }
}

fn number_string(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i128),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Runtime-defined entity backed by a JSON row (e.g. loaded with `row_to_json`).
#[derive(Debug, Clone)]
pub struct Record {
    kind: TypeKey,
    fields: Map<String, JsonValue>,
}

impl Record {
    pub fn new(kind: TypeKey, fields: Map<String, JsonValue>) -> Self {
        Self { kind, fields }
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }
}

impl Entity for Record {
    fn type_key(&self) -> TypeKey {
        self.kind
    }

    fn field(&self, name: &str) -> Value {
        self.fields.get(name).cloned().map_or(Value::Undefined, Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_conversion_keeps_structure() {
        let value = Value::from(json!({ "a": [1, "x", null], "b": { "c": true } }));
        match value.member("a") {
            Value::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(value.member("b").member("c"), Value::Bool(true)));
        assert!(value.member("missing").is_undefined());
    }

    #[test]
    fn record_fields_resolve_by_name() {
        let fields = json!({ "id": 7, "email": "a@b.c" });
        let record = Record::new(
            TypeKey::named("users"),
            fields.as_object().cloned().unwrap_or_default(),
        );
        assert!(matches!(record.field("email"), Value::String(ref s) if s == "a@b.c"));
        assert!(record.field("password").is_undefined());
        assert_eq!(record.type_key().name(), "users");
    }

    #[test]
    fn params_stringify_like_query_strings() {
        assert_eq!(to_param_string(None), "");
        assert_eq!(to_param_string(Some(&json!(null))), "");
        assert_eq!(to_param_string(Some(&json!(0))), "0");
        assert_eq!(to_param_string(Some(&json!(1.0))), "1");
        assert_eq!(to_param_string(Some(&json!(10.5))), "10.5");
        assert_eq!(to_param_string(Some(&json!(false))), "false");
        assert_eq!(to_param_string(Some(&json!(["a", 1]))), "a,1");
        assert_eq!(to_param_string(Some(&json!({ "a": 1 }))), "[object Object]");
    }

    #[test]
    fn option_none_is_undefined() {
        let none: Option<String> = None;
        assert!(Value::from(none).is_undefined());
        assert!(matches!(Value::from(f64::NAN), Value::Null));
    }
}
