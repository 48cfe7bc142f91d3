//! Plugins shipped with the framework.

pub mod user;

pub use user::UserPlugin;
