use crate::app::plugin::ControllerBinding;
use crate::domain::controller::dispatch;
use crate::domain::error::HttpError;
use crate::domain::protocol::{Envelope, RequestContext};
use crate::transport::http::firewall::CurrentUser;
use crate::transport::http::types::AppState;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method};
use axum::Extension;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Serves every verb on a controller route; the dispatcher decides what is allowed.
pub async fn controller_endpoint(
    State(state): State<AppState>,
    Extension(binding): Extension<ControllerBinding>,
    user: Option<Extension<CurrentUser>>,
    method: Method,
    params: Option<Path<HashMap<String, String>>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Envelope, HttpError> {
    let params = params
        .map(|Path(params)| {
            params
                .into_iter()
                .map(|(k, v)| (k, JsonValue::String(v)))
                .collect::<Map<_, _>>()
        })
        .unwrap_or_default();

    let mut request = RequestContext::new(method)
        .with_query(parse_query(query.as_deref()))
        .with_body(parse_body(&headers, &body)?)
        .with_params(JsonValue::Object(params))
        .with_user(user.map(|Extension(CurrentUser(user))| user));

    let controller = binding.instantiate(state.container.clone());
    dispatch(controller.as_ref(), &mut request, &state.protocol).await
}

/// Answers unmatched paths.
pub async fn not_found() -> HttpError {
    HttpError::not_found()
}

/// Repeated keys collect into an array, in order of appearance.
pub fn parse_query(query: Option<&str>) -> JsonValue {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        let value = JsonValue::String(value.into_owned());
        match fields.get_mut(key.as_ref()) {
            Some(JsonValue::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = JsonValue::Array(vec![first, value]);
            }
            None => {
                fields.insert(key.into_owned(), value);
            }
        }
    }
    JsonValue::Object(fields)
}

/// JSON bodies only; other content types and empty bodies contribute nothing.
pub fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<JsonValue, HttpError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |v| v.contains("json"));
    if !is_json || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(JsonValue::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "malformed JSON body");
        HttpError::bad_request()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn query_decodes_and_groups_repeats() {
        assert_eq!(
            parse_query(Some("a=1&b=hello%20world&a=2&a=3")),
            json!({ "a": ["1", "2", "3"], "b": "hello world" })
        );
        assert_eq!(parse_query(None), json!({}));
    }

    #[test]
    fn body_parsing_follows_content_type() {
        let mut json_headers = HeaderMap::new();
        json_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(
            parse_body(&json_headers, &Bytes::from_static(br#"{"a":1}"#)).unwrap(),
            json!({ "a": 1 })
        );
        assert_eq!(parse_body(&json_headers, &Bytes::new()).unwrap(), json!({}));
        assert!(matches!(
            parse_body(&json_headers, &Bytes::from_static(b"{")),
            Err(HttpError::BadRequest(_))
        ));

        let mut text_headers = HeaderMap::new();
        text_headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(parse_body(&text_headers, &Bytes::from_static(b"{")).unwrap(), json!({}));
    }
}
