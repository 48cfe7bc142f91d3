pub mod error;
pub mod firewall;
pub mod router;
pub mod types;
pub mod handlers {
    pub mod controller;
    pub mod health;
}

pub use firewall::{
    CurrentUser, Firewall, JwtVerifier, StaticTokens, TokenVerifier, UserProvider, USER_PROVIDER,
};
pub use router::{create_router, ApiDoc};
pub use types::{AppState, MountedRoute};
