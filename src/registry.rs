//! In-memory catalog of collection definitions
//!
//! The registry answers schema lookups for every other component. It is
//! backed by the metadata table: `save_collection` writes a row and then
//! updates memory, `load_from_db` fills memory from every stored row.
//! The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::Result;
use crate::schema::{Collection, RuleAction};
use crate::sql::ddl::NOW_SQL;
use crate::sql::sanitize::quote_identifier;
use crate::types::{CollectionType, Field, FieldType, now_timestamp};

/// Rule applied to every system collection
pub const SYSTEM_RULE: &str = "@request.auth.id != ''";

/// Name of the auth collection created at bootstrap
pub const USERS_COLLECTION: &str = "users";

/// Thread-safe catalog of collections, keyed by name
pub struct SchemaRegistry {
    pool: SqlitePool,
    metadata_table: String,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl SchemaRegistry {
    pub fn new(pool: SqlitePool, metadata_table: impl Into<String>) -> Self {
        Self {
            pool,
            metadata_table: metadata_table.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn metadata_table(&self) -> &str {
        &self.metadata_table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Memory operations
    // =========================================================================

    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All collections, newest `created` first
    pub fn get_collections(&self) -> Vec<Arc<Collection>> {
        let mut collections: Vec<Arc<Collection>> = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        collections.sort_by_cached_key(|c| std::cmp::Reverse(created_sort_key(&c.created)));
        collections
    }

    /// Register a collection in memory only
    pub fn add_collection(&self, collection: Collection) -> Arc<Collection> {
        let collection = Arc::new(collection);
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.name.clone(), Arc::clone(&collection));
        collection
    }

    /// Forget a collection in memory only
    pub fn remove_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn len(&self) -> usize {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Upsert the metadata row for `collection`, then update memory
    ///
    /// The id defaults to `col_<name>`. On conflict the existing row keeps its
    /// id and `created`, and `updated` is bumped.
    pub async fn save_collection(&self, mut collection: Collection) -> Result<Arc<Collection>> {
        collection.validate()?;
        if collection.id.is_empty() {
            collection.id = format!("col_{}", collection.name);
        }

        let fields_json = serde_json::to_string(&collection.fields)?;
        let indexes_json = serde_json::to_string(&collection.indexes)?;
        let table = quote_identifier(&self.metadata_table);

        let sql = format!(
            r#"INSERT INTO {table} ("id", "name", "type", "fields", "indexes", "list_rule", "view_rule", "create_rule", "update_rule", "delete_rule")
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT("name") DO UPDATE SET
    "type" = excluded."type",
    "fields" = excluded."fields",
    "indexes" = excluded."indexes",
    "list_rule" = excluded."list_rule",
    "view_rule" = excluded."view_rule",
    "create_rule" = excluded."create_rule",
    "update_rule" = excluded."update_rule",
    "delete_rule" = excluded."delete_rule",
    "updated" = {NOW_SQL}
RETURNING "id", "created", "updated""#
        );

        let row = sqlx::query(&sql)
            .bind(&collection.id)
            .bind(&collection.name)
            .bind(collection.collection_type.as_str())
            .bind(fields_json)
            .bind(indexes_json)
            .bind(collection.rule(RuleAction::List))
            .bind(collection.rule(RuleAction::View))
            .bind(collection.rule(RuleAction::Create))
            .bind(collection.rule(RuleAction::Update))
            .bind(collection.rule(RuleAction::Delete))
            .fetch_one(&self.pool)
            .await?;

        if let Some(id) = row.try_get::<Option<String>, _>("id")? {
            collection.id = id;
        }
        collection.created = row
            .try_get::<Option<String>, _>("created")?
            .unwrap_or_default();
        collection.updated = row
            .try_get::<Option<String>, _>("updated")?
            .unwrap_or_default();

        debug!(collection = %collection.name, id = %collection.id, "saved collection metadata");
        Ok(self.add_collection(collection))
    }

    /// Populate memory from every metadata row; returns how many were loaded
    pub async fn load_from_db(&self) -> Result<usize> {
        let table = quote_identifier(&self.metadata_table);

        let backfill = format!(
            r#"UPDATE {} SET "id" = 'col_' || "name" WHERE "id" IS NULL OR "id" = ''"#,
            table
        );
        if let Err(e) = sqlx::query(&backfill).execute(&self.pool).await {
            warn!(error = %e, table = %self.metadata_table, "failed to back-fill collection ids");
        }

        let select = format!(
            r#"SELECT "id", "name", "type", "fields", "indexes", "list_rule", "view_rule", "create_rule", "update_rule", "delete_rule", "created", "updated" FROM {}"#,
            table
        );
        let rows = sqlx::query(&select).fetch_all(&self.pool).await?;

        let mut loaded = Vec::with_capacity(rows.len());
        for row in rows {
            let fields_json: String = row.try_get("fields")?;
            let fields: Vec<Field> = serde_json::from_str(&fields_json)?;
            let indexes = match row.try_get::<Option<String>, _>("indexes")? {
                Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
                _ => Vec::new(),
            };
            let collection_type: Option<String> = row.try_get("type")?;

            let mut collection = Collection::new(row.try_get::<String, _>("name")?)
                .with_id(row.try_get::<Option<String>, _>("id")?.unwrap_or_default())
                .with_type(CollectionType::parse(
                    collection_type.as_deref().unwrap_or_default(),
                ))
                .with_fields(fields);
            collection.indexes = indexes;
            collection.list_rule = row.try_get("list_rule")?;
            collection.view_rule = row.try_get("view_rule")?;
            collection.create_rule = row.try_get("create_rule")?;
            collection.update_rule = row.try_get("update_rule")?;
            collection.delete_rule = row.try_get("delete_rule")?;
            collection.created = row
                .try_get::<Option<String>, _>("created")?
                .unwrap_or_default();
            collection.updated = row
                .try_get::<Option<String>, _>("updated")?
                .unwrap_or_default();
            loaded.push(collection);
        }

        let count = loaded.len();
        {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for collection in loaded {
                collections.insert(collection.name.clone(), Arc::new(collection));
            }
        }

        debug!(count, table = %self.metadata_table, "loaded collections from metadata table");
        Ok(count)
    }

    /// Register the hardcoded system collections in memory
    ///
    /// They still need `sync_collection`, and all but the metadata
    /// collection need `save_collection`.
    pub fn bootstrap_system_collections(&self) -> Vec<Arc<Collection>> {
        system_collections(&self.metadata_table)
            .into_iter()
            .map(|c| self.add_collection(c))
            .collect()
    }
}

/// Normalized form of a `created` value for ordering
///
/// Parseable RFC 3339 timestamps are rendered as UTC with fixed precision so
/// string order equals time order; anything else is compared raw.
fn created_sort_key(created: &str) -> String {
    match DateTime::parse_from_rfc3339(created) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Nanos, true),
        Err(_) => created.to_string(),
    }
}

/// Definitions of the metadata, users, refresh token and audit log collections
pub fn system_collections(metadata_table: &str) -> Vec<Collection> {
    let now = now_timestamp();

    let metadata = Collection::new(metadata_table)
        .with_id("system_collections")
        .with_type(CollectionType::System)
        .with_fields(vec![
            Field::new("name", FieldType::Text).required().unique(),
            Field::new("type", FieldType::Text).required(),
            Field::new("fields", FieldType::Json).required(),
            Field::new("indexes", FieldType::Json),
            Field::new("list_rule", FieldType::Text),
            Field::new("view_rule", FieldType::Text),
            Field::new("create_rule", FieldType::Text),
            Field::new("update_rule", FieldType::Text),
            Field::new("delete_rule", FieldType::Text),
        ]);

    let users = Collection::new(USERS_COLLECTION)
        .with_id("system_users")
        .with_type(CollectionType::Auth)
        .with_fields(vec![
            Field::new("username", FieldType::Text).required().unique(),
            Field::new("email", FieldType::Text).required().unique(),
            Field::new("password", FieldType::Text).required(),
            Field::new("lastLogin", FieldType::Date),
        ]);

    let refresh_tokens = Collection::new("_refresh_tokens")
        .with_id("system_refresh_tokens")
        .with_type(CollectionType::System)
        .with_fields(vec![
            Field::new("token", FieldType::Text).required().unique(),
            Field::new("user_id", FieldType::Text).required(),
            Field::new("expires", FieldType::Date).required(),
        ]);

    let audit_logs = Collection::new("_audit_logs")
        .with_id("system_audit_logs")
        .with_type(CollectionType::System)
        .with_fields(vec![
            Field::new("action", FieldType::Text).required(),
            Field::new("resource", FieldType::Text).required(),
            Field::new("admin_id", FieldType::Text).required(),
            Field::new("details", FieldType::Json),
            Field::new("timestamp", FieldType::Date).required(),
        ]);

    [metadata, users, refresh_tokens, audit_logs]
        .into_iter()
        .map(|mut c| {
            c.created = now.clone();
            c.updated = now.clone();
            c.with_all_rules(SYSTEM_RULE)
        })
        .collect()
}
