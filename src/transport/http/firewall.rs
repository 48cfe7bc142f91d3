//! Bearer-token authentication for secured routes.
//!
//! Token checks are delegated to a [`TokenVerifier`]; users are resolved
//! through the `userProvider` service of the container. [`JwtVerifier`]
//! handles HS256 tokens signed with the base64 `app.secret` setting.

use crate::app::container::Container;
use crate::domain::error::HttpError;
use crate::domain::value::Entity;
use anyhow::Context;
use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

pub const USER_PROVIDER: &str = "userProvider";

const INVALID_TOKEN: &str = "Invalid Authentication Token";

/// Checks a bearer token and returns the id of the user it was issued to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait UserProvider: Send + Sync {
    async fn get_user(&self, id: &str) -> anyhow::Result<Option<Arc<dyn Entity>>>;
}

/// Fixed token -> user id table.
#[derive(Clone, Debug, Default)]
pub struct StaticTokens(HashMap<String, String>);

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.0.insert(token.into(), user_id.into());
        self
    }
}

impl From<HashMap<String, String>> for StaticTokens {
    fn from(tokens: HashMap<String, String>) -> Self {
        Self(tokens)
    }
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.get(token).cloned())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: JsonValue,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

/// Signs and checks HS256 JSON web tokens whose `userId` claim names the user.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Builds a verifier from a base64 encoded secret, as stored in `app.secret`.
    pub fn from_base64(secret: &str) -> anyhow::Result<Self> {
        let secret = BASE64_STANDARD
            .decode(secret.trim())
            .context("app.secret is not valid base64")?;
        if secret.is_empty() {
            anyhow::bail!("app.secret is empty");
        }
        Ok(Self::new(&secret))
    }

    /// Returns a token for `user_id` that expires after `ttl`.
    pub fn sign_auth_token(&self, user_id: &str, ttl: chrono::Duration) -> anyhow::Result<String> {
        let iat = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: JsonValue::String(user_id.to_string()),
            iat,
            exp: iat + ttl.num_seconds(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign authentication token")
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> anyhow::Result<Option<String>> {
        let claims = match jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "bearer token rejected");
                return Ok(None);
            }
        };
        Ok(match claims.user_id {
            JsonValue::String(id) => Some(id),
            JsonValue::Number(id) => Some(id.to_string()),
            _ => None,
        })
    }
}

/// The authenticated user, attached to the request before dispatch.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Arc<dyn Entity>);

#[derive(Clone)]
pub struct Firewall {
    verifier: Arc<dyn TokenVerifier>,
    container: Container,
}

impl Firewall {
    pub fn new(verifier: Arc<dyn TokenVerifier>, container: Container) -> Self {
        Self {
            verifier,
            container,
        }
    }

    /// Resolves the user behind `headers`' bearer token.
    pub async fn authenticate_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<Arc<dyn Entity>, HttpError> {
        let token = bearer_token(headers).ok_or_else(invalid_token)?;

        let user_id = match self.verifier.verify(token).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return Err(invalid_token()),
            Err(e) => {
                tracing::warn!(error = %e, "token verification failed");
                return Err(invalid_token());
            }
        };

        let provider = self
            .container
            .get::<Arc<dyn UserProvider>>(USER_PROVIDER)
            .await?;
        provider
            .get_user(&user_id)
            .await?
            .ok_or_else(invalid_token)
    }
}

fn invalid_token() -> HttpError {
    HttpError::AccessDenied(INVALID_TOKEN.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware for secured routes.
pub async fn authenticate(
    State(firewall): State<Firewall>,
    mut request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let user = firewall.authenticate_headers(request.headers()).await?;
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
