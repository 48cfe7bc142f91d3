//! PostgreSQL persistence: the `database` service and the entity store behind `isEntityId`.

use crate::app::container::{Container, ServiceDef};
use crate::domain::constraint::EntityStore;
use crate::domain::value::{Entity, Record, TypeKey};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;

pub const DATABASE_SERVICE: &str = "database";

/// Pool connected on first use and closed at container shutdown.
pub fn database_service(url: String, max_connections: u32) -> ServiceDef {
    ServiceDef::managed(
        move |_| {
            let url = url.clone();
            async move {
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(&url)
                    .await
                    .context("failed to connect to the database")?;
                tracing::info!(max_connections, "database pool connected");
                Ok(pool)
            }
        },
        |pool: Arc<PgPool>| async move {
            pool.close().await;
            Ok(())
        },
    )
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*` so identifiers can be spliced into SQL.
pub fn validate_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone, Debug)]
struct EntityTable {
    kind: TypeKey,
    table: String,
    primary_key: String,
}

/// Resolves entities by loading `row_to_json` rows from registered tables.
///
/// The pool is taken from the container's `database` service on each lookup.
pub struct PgEntityStore {
    container: Container,
    tables: HashMap<String, EntityTable>,
}

impl PgEntityStore {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            tables: HashMap::new(),
        }
    }

    /// Maps the entity type name used in `isEntityId` options to a table.
    ///
    /// Rows come back as [`Record`]s tagged with `kind`, so exposure rules
    /// registered for `kind` apply when they are serialized.
    pub fn register(
        mut self,
        name: impl Into<String>,
        kind: TypeKey,
        table: &str,
        primary_key: &str,
    ) -> anyhow::Result<Self> {
        if !validate_ident(table) || !validate_ident(primary_key) {
            anyhow::bail!("Invalid table or column name: {}.{}", table, primary_key);
        }
        self.tables.insert(
            name.into(),
            EntityTable {
                kind,
                table: table.to_string(),
                primary_key: primary_key.to_string(),
            },
        );
        Ok(self)
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn get_entity(&self, kind: &str, id: &str) -> anyhow::Result<Option<Arc<dyn Entity>>> {
        let entry = self
            .tables
            .get(kind)
            .with_context(|| format!("Entity type '{}' is not registered", kind))?;
        let pool = self.container.get::<PgPool>(DATABASE_SERVICE).await?;

        let sql = format!(
            "SELECT row_to_json({table}.*) AS record FROM {table} WHERE {pk}::text = $1",
            table = entry.table,
            pk = entry.primary_key
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(pool.as_ref()).await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let record: JsonValue = row.try_get("record")?;
        let JsonValue::Object(fields) = record else {
            anyhow::bail!("row_to_json returned a non-object for {}", entry.table);
        };
        Ok(Some(Arc::new(Record::new(entry.kind, fields))))
    }
}
