use crate::domain::constraint::EntityStore;
use crate::domain::value::Entity;
use crate::plugins::user::entities::{Resource, User};
use crate::transport::http::UserProvider;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Entity type name resolved by `isEntityId` for users.
pub const USERS: &str = "users";

#[derive(Clone, Debug, Default)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
}

/// Fields to change; `None` leaves the stored value alone.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserStoreError {
    #[error("the email is already registered")]
    EmailTaken,
    #[error("no live user with this id")]
    NotFound,
}

/// Salted SHA-256 digest of a password, hex encoded.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn email_taken(users: &HashMap<String, Arc<User>>, email: &str, except: Option<&str>) -> bool {
    users.values().any(|u| {
        !u.resource.is_deleted
            && Some(u.id()) != except
            && u.email.eq_ignore_ascii_case(email)
    })
}

/// In-process user table. Removal is soft: removed users stay stored but are
/// invisible to every lookup.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, Arc<User>>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user; only the salted digest of the password is kept.
    pub async fn create(&self, input: NewUser) -> Result<Arc<User>, UserStoreError> {
        let mut users = self.users.write().await;
        if email_taken(&users, &input.email, None) {
            return Err(UserStoreError::EmailTaken);
        }

        let salt = uuid::Uuid::new_v4().simple().to_string();
        let user = Arc::new(User {
            resource: Resource::new(),
            email: input.email,
            password: hash_password(&salt, &input.password),
            salt,
            display_name: input.display_name,
            first_name: input.first_name,
            last_name: input.last_name,
        });
        users.insert(user.id().to_string(), user.clone());
        tracing::debug!(user_id = %user.id(), "user created");
        Ok(user)
    }

    pub async fn find(&self, id: &str) -> Option<Arc<User>> {
        self.users
            .read()
            .await
            .get(id)
            .filter(|u| !u.resource.is_deleted)
            .cloned()
    }

    /// Live users, oldest first.
    pub async fn list(&self) -> Vec<Arc<User>> {
        let mut users: Vec<_> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| !u.resource.is_deleted)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.resource.created_on.cmp(&b.resource.created_on));
        users
    }

    pub async fn update(&self, id: &str, patch: UserPatch) -> Result<Arc<User>, UserStoreError> {
        let mut users = self.users.write().await;
        let current = users
            .get(id)
            .filter(|u| !u.resource.is_deleted)
            .ok_or(UserStoreError::NotFound)?;
        if let Some(email) = &patch.email {
            if email_taken(&users, email, Some(id)) {
                return Err(UserStoreError::EmailTaken);
            }
        }

        let mut user = User::clone(current);
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(display_name) = patch.display_name {
            user.display_name = display_name;
        }
        if let Some(first_name) = patch.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = last_name;
        }
        user.resource.touch();

        let user = Arc::new(user);
        users.insert(id.to_string(), user.clone());
        Ok(user)
    }

    /// Returns `false` when there was no live user with this id.
    pub async fn remove(&self, id: &str) -> bool {
        let mut users = self.users.write().await;
        let Some(current) = users.get(id).filter(|u| !u.resource.is_deleted) else {
            return false;
        };

        let mut user = User::clone(current);
        user.resource.is_deleted = true;
        user.resource.deleted_on = Some(Utc::now());
        users.insert(id.to_string(), Arc::new(user));
        tracing::debug!(user_id = id, "user removed");
        true
    }
}

#[async_trait]
impl EntityStore for UserStore {
    async fn get_entity(&self, kind: &str, id: &str) -> anyhow::Result<Option<Arc<dyn Entity>>> {
        if kind != USERS {
            anyhow::bail!("unknown entity type \"{}\"", kind);
        }
        Ok(self.find(id).await.map(|user| user as Arc<dyn Entity>))
    }
}

#[async_trait]
impl UserProvider for UserStore {
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<Arc<dyn Entity>>> {
        Ok(self.find(id).await.map(|user| user as Arc<dyn Entity>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser {
        NewUser {
            email: "alice@example.com".into(),
            password: "correct horse".into(),
            display_name: "Alice".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn email_must_be_unique() {
        let store = UserStore::new();
        assert!(store.create(alice()).await.is_ok());
        let mut again = alice();
        again.email = "ALICE@example.com".into();
        assert_eq!(store.create(again).await.unwrap_err(), UserStoreError::EmailTaken);
    }

    #[tokio::test]
    async fn update_cannot_take_another_users_email() {
        let store = UserStore::new();
        let a = store.create(alice()).await.unwrap();
        let mut bob = alice();
        bob.email = "bob@example.com".into();
        store.create(bob).await.unwrap();

        let patch = UserPatch {
            email: Some("BOB@example.com".into()),
            ..Default::default()
        };
        assert_eq!(store.update(a.id(), patch).await.unwrap_err(), UserStoreError::EmailTaken);
        let owners = store.list().await;
        let owners: Vec<_> = owners.iter().filter(|u| u.email == "bob@example.com").collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(store.find(a.id()).await.unwrap().email, "alice@example.com");

        // Re-submitting one's own email is not a conflict.
        let patch = UserPatch {
            email: Some("Alice@example.com".into()),
            ..Default::default()
        };
        assert_eq!(store.update(a.id(), patch).await.unwrap().email, "Alice@example.com");
    }

    #[tokio::test]
    async fn update_of_unknown_user_is_not_found() {
        let store = UserStore::new();
        let err = store.update("missing", UserPatch::default()).await.unwrap_err();
        assert_eq!(err, UserStoreError::NotFound);
    }

    #[tokio::test]
    async fn passwords_are_stored_as_salted_digests() {
        let store = UserStore::new();
        let a = store.create(alice()).await.unwrap();
        assert_ne!(a.password, "correct horse");
        assert_eq!(a.password.len(), 64);
        assert_eq!(a.password, hash_password(&a.salt, "correct horse"));

        let mut bob = alice();
        bob.email = "bob@example.com".into();
        let b = store.create(bob).await.unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password, b.password);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let store = UserStore::new();
        let user = store.create(alice()).await.unwrap();
        let patch = UserPatch {
            last_name: Some("Liddell".into()),
            ..Default::default()
        };
        let updated = store.update(user.id(), patch).await.unwrap();
        assert_eq!(updated.display_name, "Alice");
        assert_eq!(updated.last_name, "Liddell");
        assert!(updated.resource.modified_on.is_some());
    }

    #[tokio::test]
    async fn removed_users_are_invisible() {
        let store = UserStore::new();
        let user = store.create(alice()).await.unwrap();
        assert!(store.remove(user.id()).await);
        assert!(!store.remove(user.id()).await);
        assert!(store.find(user.id()).await.is_none());
        assert!(store.list().await.is_empty());
        assert!(store.get_entity(USERS, user.id()).await.unwrap().is_none());
        // The email is free again.
        assert!(store.create(alice()).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_entity_type_is_an_error() {
        let store = UserStore::new();
        assert!(store.get_entity("posts", "1").await.is_err());
    }
}
