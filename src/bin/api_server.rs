// src/bin/api_server.rs

use puro::infra::config::{self, Configs};
use puro::infra::logging::init_tracing;
use puro::plugins::UserPlugin;
use puro::transport::http::{ApiDoc, JwtVerifier, StaticTokens, TokenVerifier};
use puro::{Puro, PuroOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();
    init_tracing()?;

    // A missing params file just means defaults everywhere.
    let configs = Configs::new();
    let setting = |key: &str| -> Option<serde_json::Value> {
        configs.get_opt(key).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "configuration value ignored");
            None
        })
    };

    let mut options = PuroOptions::default();
    if let Some(basepath) = setting("basepath").and_then(|v| v.as_str().map(str::to_string)) {
        options.basepath = basepath;
    }
    tracing::info!(basepath = %options.basepath, "configuration loaded");

    // Signed tokens when `app.secret` is set; otherwise the fixed `auth.tokens` table.
    let verifier: Arc<dyn TokenVerifier> =
        match setting("app.secret").and_then(|v| v.as_str().map(str::to_string)) {
            Some(secret) => Arc::new(JwtVerifier::from_base64(&secret)?),
            None => {
                let tokens: HashMap<String, String> = setting("auth.tokens")
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                tracing::warn!(tokens = tokens.len(), "app.secret not set, using static tokens");
                Arc::new(StaticTokens::from(tokens))
            }
        };

    let users = UserPlugin::default();
    let mut puro = Puro::with_options(options)
        .entity_store(users.store())
        .token_verifier(verifier)
        .install(users);
    if let Some(url) = config::database_url() {
        let max_connections = setting("database.max_connections")
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(5);
        puro = puro.database(url, max_connections);
    }
    let app = puro.build()?;

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
    let router = app
        .router()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let bind = config::bind_address();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("api server listening on http://{}", bind);
    tracing::info!("swagger ui available at http://{}/swagger-ui", bind);

    app.serve(listener, router, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await
}
