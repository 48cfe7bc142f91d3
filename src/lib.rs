pub mod app;
pub mod domain;
pub mod infra;
pub mod plugins;
pub mod transport;

pub use app::{Application, Container, Plugin, Puro, PuroOptions, Route, ServiceDef};
pub use domain::{dispatch, Controller, Envelope, HttpError, Output, Reply, RequestContext};
