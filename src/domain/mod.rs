//! The protocol pipeline: constraints, schemas, validation, serialization and dispatch.

pub mod constraint;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod serializer;
pub mod validator;
pub mod value;

pub use controller::{dispatch, Controller, Hook, Output, Reply};
pub use error::{HintMap, HttpError, ProtocolError};
pub use protocol::{Envelope, Protocol, RequestContext};
pub use schema::{FieldConstraints, FieldRule, SchemaRegistry, ValidationSchema};
pub use value::{Entity, TypeKey, Value};
