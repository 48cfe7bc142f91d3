use crate::domain::error::ProtocolError;
use crate::domain::protocol::Envelope;
use crate::transport::http::firewall::{authenticate, Firewall};
use crate::transport::http::handlers::{controller, health};
use crate::transport::http::types::{AppState, HealthStatus, MountedRoute};
use axum::middleware;
use axum::routing::{any, get};
use axum::{Extension, Router};
use std::collections::HashSet;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(health::healthcheck_handler),
    components(schemas(Envelope, HealthStatus))
)]
pub struct ApiDoc;

/// Builds the router: health check, one catch-all-verbs endpoint per controller
/// route (secured routes behind the firewall) and the 404 fallback.
pub fn create_router(
    app_state: AppState,
    routes: Vec<MountedRoute>,
    firewall: Option<Firewall>,
) -> Result<Router, ProtocolError> {
    let mut seen = HashSet::new();
    let mut router = Router::new().route("/health", get(health::healthcheck_handler));

    for route in routes {
        if !route.path.starts_with('/') {
            return Err(ProtocolError::Configuration(format!(
                "Route path \"{}\" must start with '/'",
                route.path
            )));
        }
        if !seen.insert(route.path.clone()) {
            return Err(ProtocolError::Configuration(format!(
                "Route \"{}\" is declared twice",
                route.path
            )));
        }

        let mut endpoint = any(controller::controller_endpoint).layer(Extension(route.binding));
        if route.secured {
            let firewall = firewall.clone().ok_or_else(|| {
                ProtocolError::Configuration(format!(
                    "Route \"{}\" is secured but no token verifier is configured",
                    route.path
                ))
            })?;
            endpoint = endpoint.layer(middleware::from_fn_with_state(firewall, authenticate));
        }
        tracing::debug!(path = %route.path, secured = route.secured, "route mounted");
        router = router.route(&route.path, endpoint);
    }

    Ok(router.fallback(controller::not_found).with_state(app_state))
}
