pub mod container;
pub mod plugin;
pub mod server;

pub use container::{Container, ServiceDef, ServiceError};
pub use plugin::{ControllerBinding, Plugin, Route};
pub use server::{Application, Puro, PuroOptions};
