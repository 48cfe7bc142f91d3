//! Application assembly: plugins, services, schemas and the axum router.

use crate::app::container::Container;
use crate::app::plugin::Plugin;
use crate::domain::constraint::{Constraint, ConstraintRegistry, EntityStore};
use crate::domain::error::ProtocolError;
use crate::domain::protocol::Protocol;
use crate::domain::schema::SchemaRegistry;
use crate::infra::database::{database_service, DATABASE_SERVICE};
use crate::transport::http::{create_router, AppState, Firewall, MountedRoute, TokenVerifier};
use axum::Router;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct PuroOptions {
    /// Prefix of every plugin route.
    pub basepath: String,
}

impl Default for PuroOptions {
    fn default() -> Self {
        Self {
            basepath: "/api/".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
struct DatabaseOptions {
    url: String,
    max_connections: u32,
}

/// Builder for an [`Application`].
pub struct Puro {
    options: PuroOptions,
    plugins: Vec<Box<dyn Plugin>>,
    container: Container,
    constraints: ConstraintRegistry,
    entity_store: Option<Arc<dyn EntityStore>>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    database: Option<DatabaseOptions>,
}

impl Default for Puro {
    fn default() -> Self {
        Self::new()
    }
}

impl Puro {
    pub fn new() -> Self {
        Self::with_options(PuroOptions::default())
    }

    pub fn with_options(options: PuroOptions) -> Self {
        Self {
            options,
            plugins: Vec::new(),
            container: Container::new(),
            constraints: ConstraintRegistry::with_defaults(),
            entity_store: None,
            verifier: None,
            database: None,
        }
    }

    /// The container services are defined in; hand clones to collaborators built before `build`.
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn install(mut self, plugin: impl Plugin + 'static) -> Self {
        tracing::debug!(plugin = plugin.name(), "plugin installed");
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn constraint<C: Constraint + 'static>(mut self, constraint: C) -> Self {
        self.constraints.register(constraint);
        self
    }

    /// Enables `isEntityId`.
    pub fn entity_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.entity_store = Some(store);
        self
    }

    /// Enables secured routes.
    pub fn token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Defines the `database` service (a Postgres pool).
    pub fn database(mut self, url: impl Into<String>, max_connections: u32) -> Self {
        self.database = Some(DatabaseOptions {
            url: url.into(),
            max_connections,
        });
        self
    }

    pub fn build(self) -> Result<Application, ProtocolError> {
        let Puro {
            options,
            plugins,
            container,
            mut constraints,
            entity_store,
            verifier,
            database,
        } = self;

        if let Some(database) = database {
            container.define(
                DATABASE_SERVICE,
                database_service(database.url, database.max_connections),
            );
        }
        if let Some(store) = entity_store {
            constraints = constraints.with_entity_store(store);
        }

        let mut schemas = SchemaRegistry::new();
        let mut routes = Vec::new();
        for plugin in &plugins {
            plugin.describe(&mut schemas);
            for route in plugin.routes() {
                let binding = route.binding()?.clone();
                binding.describe(&mut schemas);
                routes.push(MountedRoute {
                    path: join_path(&options.basepath, &route.path),
                    binding,
                    secured: route.secured,
                });
            }
            for (name, def) in plugin.services() {
                container.define(name, def);
            }
            tracing::info!(plugin = plugin.name(), "plugin loaded");
        }

        let protocol = Protocol::new(Arc::new(schemas), Arc::new(constraints));
        let firewall = verifier.map(|verifier| Firewall::new(verifier, container.clone()));
        let state = AppState {
            protocol,
            container: container.clone(),
        };
        let router = create_router(state, routes, firewall)?;

        Ok(Application { router, container })
    }
}

fn join_path(basepath: &str, path: &str) -> String {
    format!(
        "{}/{}",
        basepath.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// A built application: its router and the container whose services it uses.
pub struct Application {
    router: Router,
    container: Container,
}

impl Application {
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Serves `router` (usually [`Application::router`] plus outer layers) until
    /// `shutdown` resolves, then unloads the container's services.
    pub async fn serve<F>(
        self,
        listener: tokio::net::TcpListener,
        router: Router,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::select! {
            result = axum::serve(listener, router) => {
                result?;
            }
            _ = shutdown => {
                tracing::info!("shutdown signal received");
            }
        }

        self.container.shutdown().await?;
        tracing::info!("graceful shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::plugin::Route;

    struct Orphan;

    impl Plugin for Orphan {
        fn name(&self) -> &'static str {
            "orphan"
        }

        fn routes(&self) -> Vec<Route> {
            vec![Route::unbound("/orphan")]
        }
    }

    #[test]
    fn routes_are_joined_with_the_basepath() {
        assert_eq!(join_path("/api/", "/users"), "/api/users");
        assert_eq!(join_path("/api", "users/:userId"), "/api/users/:userId");
        assert_eq!(join_path("/", "/users"), "/users");
        assert_eq!(join_path("", "/users"), "/users");
    }

    #[test]
    fn route_without_controller_fails_the_build() {
        let err = Puro::new().install(Orphan).build().err().unwrap();
        assert_eq!(err.to_string(), "Unable to find middleware for \"/orphan\"");
    }

    #[test]
    fn database_service_is_defined_when_configured() {
        let app = Puro::new()
            .database("postgres://localhost/puro", 2)
            .build()
            .unwrap();
        assert!(app.container().contains(DATABASE_SERVICE));
        assert!(!Puro::new().build().unwrap().container().contains(DATABASE_SERVICE));
    }
}
