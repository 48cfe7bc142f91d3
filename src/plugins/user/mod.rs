//! User accounts: registration, lookup by id and the authenticated profile.

pub mod controllers;
pub mod entities;
pub mod store;

use crate::app::container::ServiceDef;
use crate::app::plugin::{Plugin, Route};
use crate::domain::schema::SchemaRegistry;
use crate::transport::http::{UserProvider, USER_PROVIDER};
use controllers::{ProfileController, UserCollectionController, UserController, USER_STORE};
use entities::{Resource, User};
use std::sync::Arc;
use store::UserStore;

pub use store::{hash_password, NewUser, UserPatch, UserStoreError, USERS};

/// Serves `/users`, `/users/:userId` and the secured `/users/me`.
///
/// The same store backs the controllers, `isEntityId` lookups and the
/// firewall's user provider; pass it to `Puro::entity_store` as well.
#[derive(Clone, Default)]
pub struct UserPlugin {
    store: Arc<UserStore>,
}

impl UserPlugin {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<UserStore> {
        self.store.clone()
    }
}

impl Plugin for UserPlugin {
    fn name(&self) -> &'static str {
        "user"
    }

    fn routes(&self) -> Vec<Route> {
        vec![
            Route::controller::<ProfileController>("/users/me").secured(),
            Route::controller::<UserController>("/users/:userId"),
            Route::controller::<UserCollectionController>("/users"),
        ]
    }

    fn services(&self) -> Vec<(String, ServiceDef)> {
        let provider: Arc<dyn UserProvider> = self.store.clone();
        vec![
            (USER_STORE.to_string(), ServiceDef::shared(self.store.clone())),
            (USER_PROVIDER.to_string(), ServiceDef::value(provider)),
        ]
    }

    fn describe(&self, schemas: &mut SchemaRegistry) {
        Resource::describe(schemas);
        User::describe(schemas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::container::Container;

    #[tokio::test]
    async fn services_share_one_store() {
        let plugin = UserPlugin::default();
        let container = Container::new();
        for (name, def) in plugin.services() {
            container.define(name, def);
        }
        let store = container.get::<UserStore>(USER_STORE).await.unwrap();
        assert!(Arc::ptr_eq(&store, &plugin.store()));
        assert!(container.get::<Arc<dyn UserProvider>>(USER_PROVIDER).await.is_ok());
    }
}
