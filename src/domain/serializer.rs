//! Turns handler results into the JSON written to the wire.
//!
//! Plain bags are copied key by key; entities contribute only the fields the
//! schema registry exposes for their type (or any ancestor), under the
//! exposed name. Values that cannot be encoded are dropped with a warning.

use crate::domain::schema::SchemaRegistry;
use crate::domain::value::Value;
use chrono::SecondsFormat;
use serde_json::{Map, Value as JsonValue};

/// Entity graphs may share or cycle through `Arc`s; nesting deeper than this is dropped.
const MAX_DEPTH: usize = 64;

pub struct Serializer<'a> {
    schemas: &'a SchemaRegistry,
}

impl<'a> Serializer<'a> {
    pub fn new(schemas: &'a SchemaRegistry) -> Self {
        Self { schemas }
    }

    /// Serializes `holder[key]` into `output[output_key]` (defaults to `key`).
    ///
    /// Nothing is written when the value is undefined or unserializable.
    pub fn serialize(
        &self,
        holder: &Value,
        key: &str,
        output: &mut Map<String, JsonValue>,
        output_key: Option<&str>,
    ) {
        self.write(&holder.member(key), key, output, output_key.unwrap_or(key), 0);
    }

    /// Serializes a whole response body through a synthetic `{content}` holder.
    pub fn serialize_content(&self, content: &Value) -> Option<JsonValue> {
        let mut output = Map::new();
        self.write(content, "content", &mut output, "content", 0);
        output.remove("content")
    }

    fn write(
        &self,
        node: &Value,
        key: &str,
        output: &mut Map<String, JsonValue>,
        output_key: &str,
        depth: usize,
    ) {
        if let Some(encoded) = self.encode(node, key, depth) {
            output.insert(output_key.to_string(), encoded);
        }
    }

    fn encode(&self, node: &Value, key: &str, depth: usize) -> Option<JsonValue> {
        if depth > MAX_DEPTH {
            tracing::warn!(field = key, "Unable to serialize \"{}\": nesting too deep", key);
            return None;
        }

        match node {
            Value::Undefined => None,
            Value::Null => Some(JsonValue::Null),
            Value::Bool(b) => Some(JsonValue::Bool(*b)),
            Value::Number(n) => Some(JsonValue::Number(n.clone())),
            Value::String(s) => Some(JsonValue::String(s.clone())),
            Value::Date(date) => Some(JsonValue::String(
                date.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            Value::Array(items) => Some(JsonValue::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        self.encode(item, &idx.to_string(), depth + 1)
                            .unwrap_or(JsonValue::Null)
                    })
                    .collect(),
            )),
            Value::Object(map) => {
                let mut object = Map::new();
                for (k, v) in map {
                    self.write(v, k, &mut object, k, depth + 1);
                }
                Some(JsonValue::Object(object))
            }
            Value::Entity(entity) => {
                let mut object = Map::new();
                for (field, output_name) in self.schemas.exposed_fields(entity.type_key()) {
                    self.write(&entity.field(&field), &field, &mut object, &output_name, depth + 1);
                }
                Some(JsonValue::Object(object))
            }
            Value::Opaque(type_name) => {
                tracing::warn!(
                    field = key,
                    kind = *type_name,
                    "Unable to serialize \"{}\" of type \"{}\"",
                    key,
                    type_name
                );
                None
            }
        }
    }
}
