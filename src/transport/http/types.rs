use crate::app::container::Container;
use crate::app::plugin::ControllerBinding;
use crate::domain::protocol::Protocol;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub protocol: Protocol,
    pub container: Container,
}

/// A controller mounted at an absolute path.
#[derive(Clone, Debug)]
pub struct MountedRoute {
    pub path: String,
    pub binding: ControllerBinding,
    pub secured: bool,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthStatus {
    /// `ok` or `unhealthy`.
    pub status: String,
    /// `ok`, `unreachable` or `unconfigured`.
    pub database: String,
}
