//! Plugins bundle routes, services and schema registrations.

use crate::app::container::{Container, ServiceDef};
use crate::domain::controller::Controller;
use crate::domain::error::ProtocolError;
use crate::domain::schema::SchemaRegistry;
use crate::domain::value::TypeKey;
use std::fmt;
use std::sync::Arc;

type ControllerFactory = Arc<dyn Fn(Container) -> Box<dyn Controller> + Send + Sync>;

/// How to build a controller type and register its schemas.
#[derive(Clone)]
pub struct ControllerBinding {
    type_key: TypeKey,
    factory: ControllerFactory,
    describe: fn(&mut SchemaRegistry),
}

impl ControllerBinding {
    pub fn of<C: Controller>() -> Self {
        Self {
            type_key: TypeKey::of::<C>(),
            factory: Arc::new(|container: Container| -> Box<dyn Controller> {
                Box::new(C::build(container))
            }),
            describe: C::describe,
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// A fresh controller for one request.
    pub fn instantiate(&self, container: Container) -> Box<dyn Controller> {
        (self.factory)(container)
    }

    pub fn describe(&self, schemas: &mut SchemaRegistry) {
        (self.describe)(schemas)
    }
}

impl fmt::Debug for ControllerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerBinding")
            .field("type_key", &self.type_key)
            .finish()
    }
}

/// A path relative to the application's base path.
#[derive(Clone, Debug)]
pub struct Route {
    pub path: String,
    pub controller: Option<ControllerBinding>,
    /// Requests must carry a valid bearer token.
    pub secured: bool,
}

impl Route {
    pub fn controller<C: Controller>(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            controller: Some(ControllerBinding::of::<C>()),
            secured: false,
        }
    }

    /// A route with nothing to serve it; rejected when the application is built.
    pub fn unbound(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            controller: None,
            secured: false,
        }
    }

    pub fn secured(mut self) -> Self {
        self.secured = true;
        self
    }

    pub fn binding(&self) -> Result<&ControllerBinding, ProtocolError> {
        self.controller.as_ref().ok_or_else(|| {
            ProtocolError::Configuration(format!(
                "Unable to find middleware for \"{}\"",
                self.path
            ))
        })
    }
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn routes(&self) -> Vec<Route> {
        Vec::new()
    }

    fn services(&self) -> Vec<(String, ServiceDef)> {
        Vec::new()
    }

    /// Registers entity exposure rules (controller schemas come from the routes).
    fn describe(&self, _schemas: &mut SchemaRegistry) {}
}
