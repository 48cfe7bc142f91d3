use crate::domain::schema::{FieldRule, SchemaRegistry};
use crate::domain::value::{Entity, TypeKey, Value};
use chrono::{DateTime, Utc};

/// Bookkeeping shared by every stored record.
#[derive(Clone, Debug)]
pub struct Resource {
    pub id: String,
    pub created_on: DateTime<Utc>,
    pub modified_on: Option<DateTime<Utc>>,
    pub deleted_on: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl Resource {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_on: Utc::now(),
            modified_on: None,
            deleted_on: None,
            is_deleted: false,
        }
    }

    pub fn touch(&mut self) {
        self.modified_on = Some(Utc::now());
    }

    pub fn describe(schemas: &mut SchemaRegistry) {
        schemas.expose(TypeKey::of::<Resource>(), "id", FieldRule::expose());
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for Resource {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<Resource>()
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.clone().into(),
            "created_on" => self.created_on.into(),
            "modified_on" => self.modified_on.into(),
            "deleted_on" => self.deleted_on.into(),
            "is_deleted" => self.is_deleted.into(),
            _ => Value::Undefined,
        }
    }
}

/// A registered user. Credentials are stored but never exposed.
#[derive(Clone, Debug)]
pub struct User {
    pub resource: Resource,
    pub email: String,
    pub password: String,
    pub salt: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    pub fn id(&self) -> &str {
        &self.resource.id
    }

    pub fn describe(schemas: &mut SchemaRegistry) {
        let user = TypeKey::of::<User>();
        schemas.inherit(user, TypeKey::of::<Resource>());
        schemas.expose(user, "email", FieldRule::expose());
        schemas.expose(user, "display_name", FieldRule::renamed("displayName"));
        schemas.expose(user, "first_name", FieldRule::renamed("firstName"));
        schemas.expose(user, "last_name", FieldRule::renamed("lastName"));
    }
}

impl Entity for User {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<User>()
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "email" => self.email.clone().into(),
            "password" => self.password.clone().into(),
            "salt" => self.salt.clone().into(),
            "display_name" => self.display_name.clone().into(),
            "first_name" => self.first_name.clone().into(),
            "last_name" => self.last_name.clone().into(),
            _ => self.resource.field(name),
        }
    }
}
