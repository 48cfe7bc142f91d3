use crate::app::container::Container;
use crate::domain::controller::{Controller, Hook, Output};
use crate::domain::error::HttpError;
use crate::domain::protocol::RequestContext;
use crate::domain::schema::{FieldConstraints, SchemaRegistry, ValidationSchema};
use crate::domain::value::{Entity, TypeKey, Value};
use crate::plugins::user::store::{NewUser, UserPatch, UserStore, UserStoreError, USERS};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const USER_STORE: &str = "userStore";

fn user_id() -> FieldConstraints {
    FieldConstraints::new()
        .rule("isRequired")
        .with("isEntityId", json!({ "type": USERS, "name": "user" }))
}

fn display_name() -> FieldConstraints {
    FieldConstraints::new().with("isLength", json!({ "max": 128 }))
}

fn person_name() -> FieldConstraints {
    FieldConstraints::new().with("isLength", json!({ "max": 64 }))
}

fn text(request: &RequestContext, name: &str) -> Option<String> {
    request.param_str(name).map(str::to_string)
}

fn entity_value(user: Arc<dyn Entity>) -> Value {
    Value::from(user)
}

impl From<UserStoreError> for HttpError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::EmailTaken => {
                HttpError::BadRequest("The email is already registered".to_string())
            }
            UserStoreError::NotFound => HttpError::not_found(),
        }
    }
}

/// `/users`: registration and listing.
pub struct UserCollectionController {
    container: Container,
}

#[async_trait]
impl Controller for UserCollectionController {
    fn build(container: Container) -> Self {
        Self { container }
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Create, Hook::Read]
    }

    fn describe(schemas: &mut SchemaRegistry) {
        schemas.set_schema(
            TypeKey::of::<Self>(),
            Hook::Create.name(),
            ValidationSchema::new()
                .field("email", FieldConstraints::new().rule("isRequired").rule("isEmail"))
                .field(
                    "password",
                    FieldConstraints::new()
                        .rule("isRequired")
                        .with("isLength", json!({ "min": 8, "max": 128 })),
                )
                .field("displayName", display_name())
                .field("firstName", person_name())
                .field("lastName", person_name()),
        );
    }

    async fn create(&self, request: &mut RequestContext) -> Result<Output, HttpError> {
        let store = self.container.get::<UserStore>(USER_STORE).await?;
        let input = NewUser {
            email: text(request, "email").unwrap_or_default(),
            password: text(request, "password").unwrap_or_default(),
            display_name: text(request, "displayName").unwrap_or_default(),
            first_name: text(request, "firstName").unwrap_or_default(),
            last_name: text(request, "lastName").unwrap_or_default(),
        };
        let user = store.create(input).await?;
        Ok(Output::ready(entity_value(user)))
    }

    async fn read(&self, _request: &mut RequestContext) -> Result<Output, HttpError> {
        let container = self.container.clone();
        Ok(Output::deferred(async move {
            let store = container.get::<UserStore>(USER_STORE).await?;
            let users: Vec<Value> = store
                .list()
                .await
                .into_iter()
                .map(|user| entity_value(user))
                .collect();
            Ok(Value::Array(users))
        }))
    }
}

/// `/users/:userId`: one user, resolved by `isEntityId` before the hook runs.
pub struct UserController {
    container: Container,
}

impl UserController {
    fn resolved(request: &RequestContext) -> Result<(String, Arc<dyn Entity>), HttpError> {
        let user = request.entity("user").cloned().ok_or_else(HttpError::not_found)?;
        let id = text(request, "userId").ok_or_else(HttpError::not_found)?;
        Ok((id, user))
    }
}

#[async_trait]
impl Controller for UserController {
    fn build(container: Container) -> Self {
        Self { container }
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Read, Hook::Update, Hook::Remove]
    }

    fn describe(schemas: &mut SchemaRegistry) {
        let target = TypeKey::of::<Self>();
        let by_id = ValidationSchema::new().field("userId", user_id());
        schemas.set_schema(target, Hook::Read.name(), by_id.clone());
        schemas.set_schema(target, Hook::Remove.name(), by_id);
        schemas.set_schema(
            target,
            Hook::Update.name(),
            ValidationSchema::new()
                .field("userId", user_id())
                .field("email", FieldConstraints::new().rule("isEmail"))
                .field("displayName", display_name())
                .field("firstName", person_name())
                .field("lastName", person_name()),
        );
    }

    async fn read(&self, request: &mut RequestContext) -> Result<Output, HttpError> {
        let (_, user) = Self::resolved(request)?;
        Ok(Output::ready(entity_value(user)))
    }

    async fn update(&self, request: &mut RequestContext) -> Result<Output, HttpError> {
        let (id, _) = Self::resolved(request)?;
        let patch = UserPatch {
            email: text(request, "email").filter(|v| !v.is_empty()),
            display_name: text(request, "displayName"),
            first_name: text(request, "firstName"),
            last_name: text(request, "lastName"),
        };
        let store = self.container.get::<UserStore>(USER_STORE).await?;
        store.update(&id, patch).await?;
        Ok(Output::empty())
    }

    async fn remove(&self, request: &mut RequestContext) -> Result<Output, HttpError> {
        let (id, _) = Self::resolved(request)?;
        let store = self.container.get::<UserStore>(USER_STORE).await?;
        if !store.remove(&id).await {
            return Err(HttpError::not_found());
        }
        Ok(Output::empty())
    }
}

/// `/users/me`: the authenticated user.
pub struct ProfileController;

#[async_trait]
impl Controller for ProfileController {
    fn build(_container: Container) -> Self {
        ProfileController
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Read]
    }

    async fn read(&self, request: &mut RequestContext) -> Result<Output, HttpError> {
        let user = request.user.clone().ok_or_else(HttpError::access_denied)?;
        Ok(Output::ready(entity_value(user)))
    }
}
