//! Schema side tables.
//!
//! Rules are attached to `(type, property)` pairs by explicit registration
//! calls and never live on the values themselves. Types declare their base
//! type with [`Annotations::extend`]; lookups walk that chain so a property
//! annotated on a base type is visible on every derived type.

use crate::domain::constraint::ConstraintOptions;
use crate::domain::error::ProtocolError;
use crate::domain::value::TypeKey;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// Per-property rules keyed by type identity.
#[derive(Clone, Debug)]
pub struct Annotations<R> {
    rules: HashMap<TypeKey, Vec<(String, R)>>,
    parents: HashMap<TypeKey, TypeKey>,
}

impl<R> Default for Annotations<R> {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            parents: HashMap::new(),
        }
    }
}

impl<R> Annotations<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `rule` to `target.key`; an existing rule for the same pair is replaced.
    pub fn set(&mut self, target: TypeKey, key: impl Into<String>, rule: R) {
        let key = key.into();
        let entries = self.rules.entry(target).or_default();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = rule,
            None => entries.push((key, rule)),
        }
    }

    /// Looks the rule up on `target`, then on each ancestor.
    pub fn get(&self, target: TypeKey, key: &str) -> Option<&R> {
        self.lineage(target).into_iter().find_map(|ty| {
            self.rules
                .get(&ty)?
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, rule)| rule)
        })
    }

    pub fn has(&self, target: TypeKey, key: &str) -> bool {
        self.get(target, key).is_some()
    }

    /// Declares `parent` as the base type of `child`.
    pub fn extend(&mut self, child: TypeKey, parent: TypeKey) {
        self.parents.insert(child, parent);
    }

    /// `target` followed by its ancestors, nearest first.
    pub fn lineage(&self, target: TypeKey) -> Vec<TypeKey> {
        let mut chain = vec![target];
        let mut seen = HashSet::from([target]);
        let mut current = target;
        while let Some(parent) = self.parents.get(&current) {
            if !seen.insert(*parent) {
                break;
            }
            chain.push(*parent);
            current = *parent;
        }
        chain
    }

    /// Every annotated property visible on `target`, ancestors' properties first.
    ///
    /// A property re-annotated on a derived type keeps its original position
    /// but takes the derived rule.
    pub fn fields(&self, target: TypeKey) -> Vec<(&str, &R)> {
        let mut fields: Vec<(&str, &R)> = Vec::new();
        for ty in self.lineage(target).into_iter().rev() {
            let Some(entries) = self.rules.get(&ty) else {
                continue;
            };
            for (key, rule) in entries {
                match fields.iter_mut().find(|(k, _)| *k == key.as_str()) {
                    Some(slot) => slot.1 = rule,
                    None => fields.push((key.as_str(), rule)),
                }
            }
        }
        fields
    }
}

/// Constraint name -> options for one field, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldConstraints(Vec<(String, ConstraintOptions)>);

impl FieldConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint without options.
    pub fn rule(self, name: impl Into<String>) -> Self {
        self.with(name, ConstraintOptions::new())
    }

    /// Adds a constraint; declaring the same name again replaces its options.
    pub fn with(mut self, name: impl Into<String>, options: impl Into<ConstraintOptions>) -> Self {
        let name = name.into();
        let options = options.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = options,
            None => self.0.push((name, options)),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstraintOptions)> {
        self.0.iter().map(|(name, options)| (name.as_str(), options))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Field -> constraints attached to a controller hook.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationSchema(Vec<(String, FieldConstraints)>);

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, constraints: FieldConstraints) -> Self {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = constraints,
            None => self.0.push((name, constraints)),
        }
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldConstraints)> {
        self.0.iter().map(|(name, constraints)| (name.as_str(), constraints))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parses `{ "field": { "isLength": { "min": 3 }, "isRequired": true } }`.
///
/// `true`, `null` and `{}` all mean "no options".
impl TryFrom<JsonValue> for ValidationSchema {
    type Error = ProtocolError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        let JsonValue::Object(fields) = value else {
            return Err(ProtocolError::Configuration(
                "A validation schema must be a JSON object".to_string(),
            ));
        };

        let mut schema = ValidationSchema::new();
        for (field, constraints) in fields {
            let JsonValue::Object(constraints) = constraints else {
                return Err(ProtocolError::Configuration(format!(
                    "The constraints of \"{}\" must be a JSON object",
                    field
                )));
            };
            let mut set = FieldConstraints::new();
            for (name, options) in constraints {
                set = match options {
                    JsonValue::Object(map) => set.with(name, map),
                    JsonValue::Bool(true) | JsonValue::Null => set.rule(name),
                    other => {
                        return Err(ProtocolError::Configuration(format!(
                            "Invalid options for \"{}\" on \"{}\": {}",
                            name, field, other
                        )))
                    }
                };
            }
            schema = schema.field(field, set);
        }
        Ok(schema)
    }
}

/// Serialization rule of one entity field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldRule {
    pub rename: Option<String>,
}

impl FieldRule {
    pub fn expose() -> Self {
        Self::default()
    }

    pub fn renamed(name: impl Into<String>) -> Self {
        Self {
            rename: Some(name.into()),
        }
    }
}

/// Both side tables, built at registration time and shared read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    pub validation: Annotations<ValidationSchema>,
    pub exposure: Annotations<FieldRule>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_schema(
        &mut self,
        target: TypeKey,
        key: impl Into<String>,
        schema: ValidationSchema,
    ) {
        self.validation.set(target, key, schema);
    }

    pub fn get_schema(&self, target: TypeKey, key: &str) -> Option<&ValidationSchema> {
        self.validation.get(target, key)
    }

    pub fn has_schema(&self, target: TypeKey, key: &str) -> bool {
        self.validation.has(target, key)
    }

    pub fn expose(&mut self, target: TypeKey, field: impl Into<String>, rule: FieldRule) {
        self.exposure.set(target, field, rule);
    }

    /// Declares `parent` as the base of `child` in both tables.
    pub fn inherit(&mut self, child: TypeKey, parent: TypeKey) {
        self.validation.extend(child, parent);
        self.exposure.extend(child, parent);
    }

    /// `(field, output name)` for every exposed field of `target`.
    pub fn exposed_fields(&self, target: TypeKey) -> Vec<(String, String)> {
        self.exposure
            .fields(target)
            .into_iter()
            .map(|(field, rule)| {
                let output = rule.rename.clone().unwrap_or_else(|| field.to_string());
                (field.to_string(), output)
            })
            .collect()
    }
}
