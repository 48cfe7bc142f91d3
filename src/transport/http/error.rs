//! Error boundary: every failure leaves the server as an envelope.

use crate::domain::error::HttpError;
use crate::domain::protocol::Envelope;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value as JsonValue;

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        Envelope {
            status: status.as_u16(),
            content: JsonValue::String(self.public_message()),
            hints: self.hints().cloned(),
        }
        .into_response()
    }
}
