//! Request preparation and the response envelope.

use crate::domain::constraint::{ConstraintRegistry, EntityMap};
use crate::domain::error::{HintMap, HttpError};
use crate::domain::schema::{SchemaRegistry, ValidationSchema};
use crate::domain::serializer::Serializer;
use crate::domain::validator::Validator;
use crate::domain::value::{Entity, Value};
use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use utoipa::ToSchema;

/// State of one inbound call.
///
/// The raw sources are kept next to the merged bag so that a failing field
/// can be traced back to the route path.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    pub query: Map<String, JsonValue>,
    pub body: Map<String, JsonValue>,
    pub params: Map<String, JsonValue>,
    pub bucket: Map<String, JsonValue>,
    pub entities: EntityMap,
    pub user: Option<Arc<dyn Entity>>,
}

impl RequestContext {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Map::new(),
            body: Map::new(),
            params: Map::new(),
            bucket: Map::new(),
            entities: EntityMap::new(),
            user: None,
        }
    }

    pub fn with_query(mut self, query: JsonValue) -> Self {
        self.query = into_map(query);
        self
    }

    /// Non-object bodies contribute no parameters.
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = into_map(body);
        self
    }

    pub fn with_params(mut self, params: JsonValue) -> Self {
        self.params = into_map(params);
        self
    }

    pub fn with_user(mut self, user: Option<Arc<dyn Entity>>) -> Self {
        self.user = user;
        self
    }

    /// Rebuilds the parameter bag and clears previously resolved entities.
    pub fn merge(&mut self) {
        self.bucket = merge_parameters(&self.query, &self.body, &self.params);
        self.entities.clear();
    }

    pub fn param(&self, name: &str) -> Option<&JsonValue> {
        self.bucket.get(name)
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(JsonValue::as_str)
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<dyn Entity>> {
        self.entities.get(name)
    }
}

fn into_map(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

/// query < body < params: route parameters always win.
pub fn merge_parameters(
    query: &Map<String, JsonValue>,
    body: &Map<String, JsonValue>,
    params: &Map<String, JsonValue>,
) -> Map<String, JsonValue> {
    let mut bucket = Map::new();
    for layer in [query, body, params] {
        for (key, value) in layer {
            bucket.insert(key.clone(), value.clone());
        }
    }
    bucket
}

/// The only body shape ever written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct Envelope {
    pub status: u16,
    #[schema(value_type = Object)]
    pub content: JsonValue,
    #[schema(value_type = Option<Object>)]
    pub hints: Option<HintMap>,
}

impl Envelope {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Validator and serializer bound to one schema registry.
#[derive(Clone)]
pub struct Protocol {
    schemas: Arc<SchemaRegistry>,
    validator: Validator,
}

impl Protocol {
    pub fn new(schemas: Arc<SchemaRegistry>, constraints: Arc<ConstraintRegistry>) -> Self {
        Self {
            schemas,
            validator: Validator::new(constraints),
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Builds the parameter bag and validates it against `schema`.
    ///
    /// A violation on any route parameter is a `NotFound`; otherwise the full
    /// hint map is returned as `InvalidParameter`.
    pub async fn prepare_request(
        &self,
        request: &mut RequestContext,
        schema: &ValidationSchema,
    ) -> Result<(), HttpError> {
        request.merge();

        let hints = self.validator.validate_request(request, schema).await?;
        if hints.is_empty() {
            return Ok(());
        }

        if hints.keys().any(|field| request.params.contains_key(field)) {
            return Err(HttpError::not_found());
        }
        Err(HttpError::invalid_parameter(hints))
    }

    pub fn prepare_response(
        &self,
        status: StatusCode,
        body: &Value,
        hints: Option<HintMap>,
    ) -> Envelope {
        let content = Serializer::new(&self.schemas)
            .serialize_content(body)
            .unwrap_or(JsonValue::Null);
        Envelope {
            status: status.as_u16(),
            content,
            hints,
        }
    }
}
