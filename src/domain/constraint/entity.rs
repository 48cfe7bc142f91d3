//! `isEntityId`: resolves an identifier through the persistence collaborator.

use super::{Constraint, ConstraintContext, ConstraintOptions};
use crate::domain::error::ProtocolError;
use crate::domain::value::Entity;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence collaborator used to resolve entities by type and id.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_entity(&self, kind: &str, id: &str) -> anyhow::Result<Option<Arc<dyn Entity>>>;
}

pub struct EntityIdConstraint {
    store: Arc<dyn EntityStore>,
}

impl EntityIdConstraint {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Constraint for EntityIdConstraint {
    fn name(&self) -> &'static str {
        "isEntityId"
    }

    fn hint_template(&self) -> &'static str {
        "The parameter must be a valid entity ID"
    }

    async fn check(
        &self,
        value: &str,
        options: &ConstraintOptions,
        context: &mut ConstraintContext<'_>,
    ) -> Result<bool, ProtocolError> {
        let kind = options.str("type").ok_or_else(|| {
            ProtocolError::Configuration(
                "The constraint \"isEntityId\" requires a \"type\" option".to_string(),
            )
        })?;

        let Some(entity) = self.store.get_entity(kind, value).await? else {
            return Ok(false);
        };

        // The resolved entity is recorded only when the schema names a slot for it.
        let slot = options.str("name");
        if let (Some(entities), Some(name)) = (context.entities.as_deref_mut(), slot) {
            entities.insert(name.to_string(), entity);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraint::{ConstraintRegistry, EntityMap};
    use crate::domain::value::{Record, TypeKey};
    use serde_json::json;

    struct StubStore;

    #[async_trait]
    impl EntityStore for StubStore {
        async fn get_entity(
            &self,
            kind: &str,
            id: &str,
        ) -> anyhow::Result<Option<Arc<dyn Entity>>> {
            if kind == "broken" {
                anyhow::bail!("connection refused");
            }
            if kind == "users" && id == "1" {
                let fields = json!({ "id": "1", "email": "foo@bar.com" });
                let record = Record::new(
                    TypeKey::named("users"),
                    fields.as_object().cloned().unwrap_or_default(),
                );
                return Ok(Some(Arc::new(record)));
            }
            Ok(None)
        }
    }

    fn registry() -> ConstraintRegistry {
        ConstraintRegistry::with_defaults().with_entity_store(Arc::new(StubStore))
    }

    #[tokio::test]
    async fn resolved_entity_is_stored_under_its_name() {
        let registry = registry();
        let mut entities = EntityMap::new();
        let options = ConstraintOptions::from(json!({ "type": "users", "name": "user" }));
        let ok = registry
            .evaluate("isEntityId", "1", &options, &mut ConstraintContext::new(&mut entities))
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(entities["user"].type_key().name(), "users");
    }

    #[tokio::test]
    async fn unknown_id_fails_without_side_effect() {
        let registry = registry();
        let mut entities = EntityMap::new();
        let options = ConstraintOptions::from(json!({ "type": "users", "name": "user" }));
        let ok = registry
            .evaluate("isEntityId", "2", &options, &mut ConstraintContext::new(&mut entities))
            .await
            .unwrap();
        assert!(!ok);
        assert!(entities.is_empty());
        assert_eq!(
            registry.hint("isEntityId", &options).unwrap(),
            "The parameter must be a valid entity ID"
        );
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let registry = registry();
        let options = ConstraintOptions::from(json!({ "type": "broken" }));
        let err = registry
            .evaluate("isEntityId", "1", &options, &mut ConstraintContext::detached())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Collaborator(_)));
    }

    #[tokio::test]
    async fn missing_type_is_a_configuration_error() {
        let mut context = ConstraintContext::detached();
        let err = registry()
            .evaluate("isEntityId", "1", &ConstraintOptions::new(), &mut context)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Configuration(_)));
    }

    #[test]
    fn not_registered_without_a_store() {
        assert!(!ConstraintRegistry::with_defaults().contains("isEntityId"));
        assert!(registry().contains("isEntityId"));
    }
}
