//! Centralized configuration (environment variables + JSON params file).
//!
//! Params come from `PURO_PARAMS` (inline JSON) when set, otherwise from the
//! file named by `PURO_PARAMS_PATH` (default `config/params.json`). They are
//! loaded on first access and addressed by dotted paths (`database.url`).

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

pub const DEFAULT_PARAMS_PATH: &str = "config/params.json";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PURO_PARAMS is not valid JSON: {0}")]
    InlineJson(#[source] serde_json::Error),

    #[error("Unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", path.display())]
    FileJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing configuration value \"{0}\"")]
    Missing(String),

    #[error("Configuration value \"{key}\" has an unexpected shape: {source}")]
    Shape {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads `.env` into the process environment; a missing file is fine.
pub fn load_env() {
    dotenv::dotenv().ok();
}

/// Address the api server binds to.
pub fn bind_address() -> String {
    std::env::var("PURO_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string())
}

/// Database URL, when persistence is configured.
pub fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

#[derive(Debug, Default)]
pub struct Configs {
    data: RwLock<Option<Arc<JsonValue>>>,
}

impl Configs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration backed by an in-memory document (never reloaded from the environment).
    pub fn from_value(value: JsonValue) -> Self {
        Self {
            data: RwLock::new(Some(Arc::new(value))),
        }
    }

    /// Value at `path`, deserialized into `T`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        self.get_opt(path)?
            .ok_or_else(|| ConfigError::Missing(path.to_string()))
    }

    /// Like [`Configs::get`], but a missing (or null) value is `Ok(None)`.
    pub fn get_opt<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        let data = self.data()?;
        match lookup(&data, path) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(node) => serde_json::from_value(node.clone())
                .map(Some)
                .map_err(|source| ConfigError::Shape {
                    key: path.to_string(),
                    source,
                }),
        }
    }

    /// Forgets the loaded document; the next access reads the sources again.
    pub fn reload(&self) {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn data(&self) -> Result<Arc<JsonValue>, ConfigError> {
        if let Some(data) = self.data.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return Ok(data.clone());
        }

        let inline = std::env::var("PURO_PARAMS").ok();
        let path = std::env::var("PURO_PARAMS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PARAMS_PATH));
        let loaded = Arc::new(load_params(inline.as_deref(), &path)?);
        tracing::debug!(inline = inline.is_some(), path = %path.display(), "configuration loaded");

        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(loaded.clone());
        Ok(loaded)
    }
}

/// Parses the inline document if present, otherwise reads `path`.
pub fn load_params(inline: Option<&str>, path: &Path) -> Result<JsonValue, ConfigError> {
    if let Some(inline) = inline {
        return serde_json::from_str(inline).map_err(ConfigError::InlineJson);
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::FileJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Walks a dotted path; numeric segments index into arrays.
fn lookup<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Database {
        url: String,
        pool: u32,
    }

    fn configs() -> Configs {
        Configs::from_value(json!({
            "app": { "secret": "c2VjcmV0", "hosts": ["a", "b"] },
            "database": { "url": "postgres://localhost/puro", "pool": 5 }
        }))
    }

    #[test]
    fn dotted_paths_resolve_nested_values() {
        let configs = configs();
        assert_eq!(configs.get::<String>("app.secret").unwrap(), "c2VjcmV0");
        assert_eq!(configs.get::<String>("app.hosts.1").unwrap(), "b");
        assert_eq!(
            configs.get::<Database>("database").unwrap(),
            Database {
                url: "postgres://localhost/puro".into(),
                pool: 5
            }
        );
    }

    #[test]
    fn missing_and_malformed_values_are_errors() {
        let configs = configs();
        assert!(matches!(configs.get::<String>("app.missing"), Err(ConfigError::Missing(_))));
        assert_eq!(configs.get_opt::<String>("app.missing").unwrap(), None);
        assert!(matches!(configs.get::<u32>("app.secret"), Err(ConfigError::Shape { .. })));
    }

    #[test]
    fn inline_params_take_precedence_over_the_file() {
        let loaded = load_params(Some(r#"{ "a": 1 }"#), Path::new("/does/not/exist.json")).unwrap();
        assert_eq!(loaded, json!({ "a": 1 }));
        assert!(matches!(
            load_params(None, Path::new("/does/not/exist.json")),
            Err(ConfigError::Read { .. })
        ));
        assert!(matches!(
            load_params(Some("{"), Path::new("unused")),
            Err(ConfigError::InlineJson(_))
        ));
    }

    #[test]
    fn params_file_is_read_when_no_inline_params() {
        let path = std::env::temp_dir().join(format!("puro-params-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "database": { "pool": 3 } }"#).unwrap();
        let loaded = load_params(None, &path).unwrap();
        assert_eq!(lookup(&loaded, "database.pool"), Some(&json!(3)));
        std::fs::remove_file(&path).unwrap();
    }
}
