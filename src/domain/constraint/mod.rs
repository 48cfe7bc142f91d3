//! Constraint registry: named predicates paired with hint templates.
//!
//! Every constraint treats the empty string as valid, except the presence
//! constraints (`isRequired`, `isNotEmpty`). Optional-but-well-formed fields
//! are declared by leaving the presence constraint out.

use crate::domain::error::ProtocolError;
use crate::domain::value::Entity;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

pub mod builtin;
mod countries;
pub mod entity;

pub use entity::{EntityIdConstraint, EntityStore};

/// Entities resolved while validating one request, keyed by caller-chosen name.
pub type EntityMap = HashMap<String, Arc<dyn Entity>>;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([^%]+)%").expect("static regex"));

/// Options bag attached to one constraint of one field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintOptions(Map<String, JsonValue>);

impl ConstraintOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Numeric option; numeric strings are accepted too.
    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Renders an option the way it appears inside a hint.
    pub fn display(&self, key: &str) -> String {
        self.0.get(key).map(display_json).unwrap_or_default()
    }
}

impl From<JsonValue> for ConstraintOptions {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

impl From<Map<String, JsonValue>> for ConstraintOptions {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

fn display_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(items) => items.iter().map(display_json).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Fills `%name%` placeholders from the constraint's own options.
pub fn render_hint(template: &str, options: &ConstraintOptions) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| options.display(&caps[1]))
        .into_owned()
}

/// Per-call state a constraint may read or fill.
#[derive(Default)]
pub struct ConstraintContext<'a> {
    pub entities: Option<&'a mut EntityMap>,
}

impl<'a> ConstraintContext<'a> {
    /// Context without a request: entity lookups still run but nothing is recorded.
    pub fn detached() -> Self {
        Self { entities: None }
    }

    pub fn new(entities: &'a mut EntityMap) -> Self {
        Self {
            entities: Some(entities),
        }
    }
}

#[async_trait]
pub trait Constraint: Send + Sync {
    fn name(&self) -> &'static str;

    fn hint_template(&self) -> &'static str;

    /// True only for constraints that check presence; all others skip empty values.
    fn checks_presence(&self) -> bool {
        false
    }

    async fn check(
        &self,
        value: &str,
        options: &ConstraintOptions,
        context: &mut ConstraintContext<'_>,
    ) -> Result<bool, ProtocolError>;
}

/// Name -> constraint table, read-only once the application is built.
#[derive(Clone, Default)]
pub struct ConstraintRegistry {
    constraints: HashMap<&'static str, Arc<dyn Constraint>>,
}

impl ConstraintRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in constraint (except `isEntityId`, which needs a store).
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        builtin::install(&mut registry);
        registry
    }

    pub fn with_entity_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.register(EntityIdConstraint::new(store));
        self
    }

    pub fn register<C: Constraint + 'static>(&mut self, constraint: C) {
        self.constraints.insert(constraint.name(), Arc::new(constraint));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constraints.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<dyn Constraint>, ProtocolError> {
        self.constraints.get(name).ok_or_else(|| {
            ProtocolError::Configuration(format!("The constraint \"{}\" does not exist", name))
        })
    }

    pub async fn evaluate(
        &self,
        name: &str,
        value: &str,
        options: &ConstraintOptions,
        context: &mut ConstraintContext<'_>,
    ) -> Result<bool, ProtocolError> {
        let constraint = self.lookup(name)?;
        if value.is_empty() && !constraint.checks_presence() {
            return Ok(true);
        }
        constraint.check(value, options, context).await
    }

    pub fn hint(&self, name: &str, options: &ConstraintOptions) -> Result<String, ProtocolError> {
        let constraint = self.lookup(name)?;
        Ok(render_hint(constraint.hint_template(), options))
    }
}
