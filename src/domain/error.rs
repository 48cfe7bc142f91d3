//! Error taxonomy of the protocol pipeline.

use axum::http::StatusCode;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> violation messages, in constraint evaluation order.
pub type HintMap = BTreeMap<String, Vec<String>>;

/// Failures raised while evaluating constraints.
///
/// These are never turned into hints: they abort validation and surface as 5xx.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Programmer error (unknown constraint, route without a controller, ...).
    #[error("{0}")]
    Configuration(String),

    /// A collaborator (persistence, service load) failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

/// An error shaped for the HTTP error boundary.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    #[error("{message}")]
    InvalidParameter { message: String, hints: HintMap },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HttpError {
    pub fn bad_request() -> Self {
        HttpError::BadRequest("Bad Request".to_string())
    }

    pub fn access_denied() -> Self {
        HttpError::AccessDenied("Forbidden".to_string())
    }

    pub fn not_found() -> Self {
        HttpError::NotFound("Not Found".to_string())
    }

    pub fn method_not_allowed() -> Self {
        HttpError::MethodNotAllowed("Method Not Allowed".to_string())
    }

    pub fn invalid_parameter(hints: HintMap) -> Self {
        HttpError::InvalidParameter {
            message: "Invalid Parameter".to_string(),
            hints,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::AccessDenied(_) => StatusCode::FORBIDDEN,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::InvalidParameter { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            HttpError::Configuration(_) | HttpError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn hints(&self) -> Option<&HintMap> {
        match self {
            HttpError::InvalidParameter { hints, .. } => Some(hints),
            _ => None,
        }
    }

    /// Message safe to send to the client; internal details never leave the server.
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() {
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<ProtocolError> for HttpError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Configuration(msg) => HttpError::Configuration(msg),
            ProtocolError::Collaborator(e) => HttpError::Internal(e),
        }
    }
}
