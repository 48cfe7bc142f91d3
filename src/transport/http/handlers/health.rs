use crate::domain::protocol::Envelope;
use crate::infra::database::DATABASE_SERVICE;
use crate::transport::http::types::{AppState, HealthStatus};
use axum::extract::State;
use axum::http::StatusCode;
use sqlx::PgPool;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (
            status = 200,
            description = "Service is healthy (DB reachable or not configured)",
            body = Envelope
        ),
        (status = 503, description = "Service is unhealthy (DB unreachable)", body = Envelope)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> Envelope {
    let database = if !state.container.contains(DATABASE_SERVICE) {
        "unconfigured"
    } else {
        match state.container.get::<PgPool>(DATABASE_SERVICE).await {
            Ok(pool) => match sqlx::query("SELECT 1").execute(pool.as_ref()).await {
                Ok(_) => "ok",
                Err(e) => {
                    tracing::warn!(error = %e, "database ping failed");
                    "unreachable"
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "database service unavailable");
                "unreachable"
            }
        }
    };

    let healthy = database != "unreachable";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthStatus {
        status: if healthy { "ok" } else { "unhealthy" }.to_string(),
        database: database.to_string(),
    };

    Envelope {
        status: status.as_u16(),
        content: serde_json::to_value(body).unwrap_or_default(),
        hints: None,
    }
}
