//! Maps HTTP verbs to CRUD hooks and drives a controller through the protocol.

use crate::app::container::Container;
use crate::domain::error::HttpError;
use crate::domain::protocol::{Envelope, Protocol, RequestContext};
use crate::domain::schema::{SchemaRegistry, ValidationSchema};
use crate::domain::value::{TypeKey, Value};
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    Create,
    Read,
    Update,
    Remove,
}

impl Hook {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::POST => Some(Hook::Create),
            Method::GET => Some(Hook::Read),
            Method::PUT => Some(Hook::Update),
            Method::DELETE => Some(Hook::Remove),
            _ => None,
        }
    }

    pub fn default_status(self) -> StatusCode {
        match self {
            Hook::Create => StatusCode::CREATED,
            Hook::Read => StatusCode::OK,
            Hook::Update | Hook::Remove => StatusCode::NO_CONTENT,
        }
    }

    /// Key under which the hook's validation schema is registered.
    pub fn name(self) -> &'static str {
        match self {
            Hook::Create => "create",
            Hook::Read => "read",
            Hook::Update => "update",
            Hook::Remove => "remove",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A handler result plus an optional status override.
#[derive(Debug, Default)]
pub struct Reply {
    pub status: Option<StatusCode>,
    pub body: Value,
}

impl Reply {
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            status: None,
            body: body.into(),
        }
    }

    pub fn with_status(status: StatusCode, body: impl Into<Value>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
        }
    }
}

type Pending = BoxFuture<'static, Result<Value, HttpError>>;

/// What a hook hands back: a value, a value still being computed, or a
/// computation to start once the hook has returned.
pub enum Output {
    Ready(Reply),
    Deferred(Pending),
    Lazy(Box<dyn FnOnce() -> Pending + Send>),
}

impl Output {
    pub fn ready(body: impl Into<Value>) -> Self {
        Output::Ready(Reply::new(body))
    }

    pub fn empty() -> Self {
        Output::Ready(Reply::default())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, HttpError>> + Send + 'static,
    {
        Output::Deferred(future.boxed())
    }

    pub fn lazy<F, Fut>(compute: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, HttpError>> + Send + 'static,
    {
        Output::Lazy(Box::new(move || compute().boxed()))
    }

    pub async fn resolve(self) -> Result<Reply, HttpError> {
        match self {
            Output::Ready(reply) => Ok(reply),
            Output::Deferred(pending) => pending.await.map(Reply::new),
            Output::Lazy(compute) => compute().await.map(Reply::new),
        }
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::ready(value)
    }
}

impl From<Reply> for Output {
    fn from(reply: Reply) -> Self {
        Output::Ready(reply)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Ready(reply) => f.debug_tuple("Ready").field(reply).finish(),
            Output::Deferred(_) => f.write_str("Deferred(..)"),
            Output::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// A resource handler. A fresh instance is built for every request.
///
/// `hooks()` lists the hooks the controller implements; a verb whose hook is
/// missing from the list is answered with 405 before validation runs.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    fn build(container: Container) -> Self
    where
        Self: Sized;

    fn hooks(&self) -> &'static [Hook];

    /// Registers the validation schemas of the hooks.
    fn describe(_schemas: &mut SchemaRegistry)
    where
        Self: Sized,
    {
    }

    fn type_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    async fn create(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
        Err(HttpError::method_not_allowed())
    }

    async fn read(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
        Err(HttpError::method_not_allowed())
    }

    async fn update(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
        Err(HttpError::method_not_allowed())
    }

    async fn remove(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
        Err(HttpError::method_not_allowed())
    }
}

/// Runs one request through `controller`.
///
/// Every failure is returned to the caller; no error body is written here.
pub async fn dispatch(
    controller: &dyn Controller,
    request: &mut RequestContext,
    protocol: &Protocol,
) -> Result<Envelope, HttpError> {
    let hook = Hook::from_method(&request.method).ok_or_else(HttpError::method_not_allowed)?;
    if !controller.hooks().contains(&hook) {
        return Err(HttpError::method_not_allowed());
    }

    let empty = ValidationSchema::new();
    let schema = protocol
        .schemas()
        .get_schema(controller.type_key(), hook.name())
        .unwrap_or(&empty);
    protocol.prepare_request(request, schema).await?;

    tracing::debug!(%hook, controller = %controller.type_key(), "dispatching");
    let output = match hook {
        Hook::Create => controller.create(request).await?,
        Hook::Read => controller.read(request).await?,
        Hook::Update => controller.update(request).await?,
        Hook::Remove => controller.remove(request).await?,
    };

    let reply = output.resolve().await?;
    let status = reply.status.unwrap_or_else(|| hook.default_status());
    Ok(protocol.prepare_response(status, &reply.body, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraint::ConstraintRegistry;
    use crate::domain::schema::FieldConstraints;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    static READ_CALLED: AtomicBool = AtomicBool::new(false);

    struct ReadOnly;

    #[async_trait]
    impl Controller for ReadOnly {
        fn build(_container: Container) -> Self {
            ReadOnly
        }

        fn hooks(&self) -> &'static [Hook] {
            &[Hook::Read]
        }

        fn describe(schemas: &mut SchemaRegistry) {
            schemas.set_schema(
                TypeKey::of::<Self>(),
                "create",
                ValidationSchema::new().field("name", FieldConstraints::new().rule("isRequired")),
            );
        }

        async fn read(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
            READ_CALLED.store(true, Ordering::SeqCst);
            Ok(Output::ready("value"))
        }
    }

    struct Deferring;

    #[async_trait]
    impl Controller for Deferring {
        fn build(_container: Container) -> Self {
            Deferring
        }

        fn hooks(&self) -> &'static [Hook] {
            &[Hook::Create, Hook::Read, Hook::Update]
        }

        async fn create(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
            Ok(Output::deferred(async { Ok(Value::from(json!({ "key": "value" }))) }))
        }

        async fn read(&self, request: &mut RequestContext) -> Result<Output, HttpError> {
            let name = request.param_str("name").unwrap_or("anonymous").to_string();
            Ok(Output::lazy(move || async move { Ok(Value::from(name)) }))
        }

        async fn update(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
            Ok(Reply::with_status(StatusCode::ACCEPTED, "queued").into())
        }
    }

    fn protocol<C: Controller>() -> Protocol {
        let mut schemas = SchemaRegistry::new();
        C::describe(&mut schemas);
        Protocol::new(Arc::new(schemas), Arc::new(ConstraintRegistry::with_defaults()))
    }

    #[test]
    fn verbs_map_to_hooks() {
        assert_eq!(Hook::from_method(&Method::POST), Some(Hook::Create));
        assert_eq!(Hook::from_method(&Method::GET), Some(Hook::Read));
        assert_eq!(Hook::from_method(&Method::PUT), Some(Hook::Update));
        assert_eq!(Hook::from_method(&Method::DELETE), Some(Hook::Remove));
        assert_eq!(Hook::from_method(&Method::PATCH), None);
        assert_eq!(Hook::Create.default_status(), StatusCode::CREATED);
        assert_eq!(Hook::Remove.default_status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn missing_hook_is_rejected_before_validation() {
        let controller = ReadOnly::build(Container::new());
        let mut request = RequestContext::new(Method::POST);
        let err = dispatch(&controller, &mut request, &protocol::<ReadOnly>())
            .await
            .unwrap_err();
        // The create schema would have produced a 422.
        assert!(matches!(err, HttpError::MethodNotAllowed(_)));
        assert!(request.bucket.is_empty());
    }

    #[tokio::test]
    async fn unsupported_verb_is_rejected() {
        let controller = ReadOnly::build(Container::new());
        let mut request = RequestContext::new(Method::PATCH);
        let err = dispatch(&controller, &mut request, &protocol::<ReadOnly>())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn deferred_output_is_awaited() {
        let controller = Deferring::build(Container::new());
        let mut request = RequestContext::new(Method::POST);
        let envelope = dispatch(&controller, &mut request, &protocol::<Deferring>())
            .await
            .unwrap();
        assert_eq!(envelope.status, 201);
        assert_eq!(envelope.content, json!({ "key": "value" }));
        assert_eq!(envelope.hints, None);
    }

    #[tokio::test]
    async fn lazy_output_is_invoked() {
        let controller = Deferring::build(Container::new());
        let mut request = RequestContext::new(Method::GET).with_query(json!({ "name": "puro" }));
        let envelope = dispatch(&controller, &mut request, &protocol::<Deferring>())
            .await
            .unwrap();
        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.content, json!("puro"));
    }

    #[tokio::test]
    async fn handler_can_override_status() {
        let controller = Deferring::build(Container::new());
        let mut request = RequestContext::new(Method::PUT);
        let envelope = dispatch(&controller, &mut request, &protocol::<Deferring>())
            .await
            .unwrap();
        assert_eq!(envelope.status, 202);
        assert_eq!(envelope.content, json!("queued"));
    }

    #[tokio::test]
    async fn ready_output_uses_default_status() {
        let controller = ReadOnly::build(Container::new());
        let mut request = RequestContext::new(Method::GET);
        let envelope = dispatch(&controller, &mut request, &protocol::<ReadOnly>())
            .await
            .unwrap();
        assert_eq!(envelope.status, 200);
        assert_eq!(envelope.content, json!("value"));
        assert!(READ_CALLED.load(Ordering::SeqCst));
    }
}
