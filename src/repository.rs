//! Generic record storage over collection tables
//!
//! Every statement is built by [`QueryBuilder`] from the collection's current
//! field list and executed through the shared [`StatementCache`]. Fields that
//! are no longer declared are dropped on write and absent on read.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::{debug, instrument};

use crate::config::DEFAULT_PER_PAGE;
use crate::error::{Result, VaultError};
use crate::record::{ListParams, Record, RecordList};
use crate::registry::SchemaRegistry;
use crate::schema::{Collection, SYSTEM_COLUMNS};
use crate::sql::builder::{QueryBuilder, SqlValue};
use crate::sql::filter::{id_in, parse_filter, parse_sort};
use crate::sql::stmt_cache::StatementCache;
use crate::types::{FieldType, now_timestamp};

/// Largest integer an f64 represents exactly
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

/// CRUD and listing for every registered collection
pub struct Repository {
    registry: Arc<SchemaRegistry>,
    stmts: StatementCache,
    default_per_page: i64,
}

impl Repository {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        let stmts = StatementCache::new(registry.pool().clone());
        Self {
            registry,
            stmts,
            default_per_page: DEFAULT_PER_PAGE,
        }
    }

    /// Page size used when a listing asks for `per_page <= 0`
    pub fn with_default_per_page(mut self, per_page: i64) -> Self {
        if per_page > 0 {
            self.default_per_page = per_page;
        }
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Number of statements executed so far
    pub fn query_count(&self) -> u64 {
        self.stmts.executed()
    }

    /// Release every cached prepared statement
    pub async fn close(&self) {
        self.stmts.close().await;
    }

    fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.registry
            .get_collection(name)
            .ok_or_else(|| VaultError::collection_not_found(name))
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Insert a record; `data["id"]` must be a non-empty string
    ///
    /// `created` and `updated` are always bound, since columns added to an
    /// existing table carry no default.
    #[instrument(skip(self, data), fields(collection = %collection_name))]
    pub async fn create_record(
        &self,
        collection_name: &str,
        data: Map<String, Value>,
    ) -> Result<Record> {
        let collection = self.collection(collection_name)?;

        let id = match data.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(VaultError::MissingId),
        };

        let mut record = Record::new(collection_name);
        record.id = id.clone();

        let now = now_timestamp();
        let mut values = vec![
            ("id".to_string(), SqlValue::Text(id)),
            ("created".to_string(), SqlValue::Text(now.clone())),
            ("updated".to_string(), SqlValue::Text(now)),
        ];
        for field in &collection.fields {
            if let Some(value) = data.get(&field.name) {
                values.push((field.name.clone(), SqlValue::for_field(field.field_type, value)));
                record.data.insert(field.name.clone(), value.clone());
            }
        }

        let (sql, args) =
            QueryBuilder::table(collection_name).build_insert(&values, &["created", "updated"]);
        let row = self
            .stmts
            .fetch_optional(&sql, &args)
            .await?
            .ok_or_else(|| VaultError::database("INSERT returned no row"))?;

        record.created = text_column(&row, "created")?;
        record.updated = text_column(&row, "updated")?;
        Ok(record)
    }

    #[instrument(skip(self), fields(collection = %collection_name))]
    pub async fn find_record_by_id(&self, collection_name: &str, id: &str) -> Result<Record> {
        let collection = self.collection(collection_name)?;
        let query = select_all(&collection).and_where("\"id\" = ?", [SqlValue::from(id)]);
        let (sql, args) = query.build_select();

        match self.stmts.fetch_optional(&sql, &args).await? {
            Some(row) => decode_record(&collection, &row),
            None => Err(VaultError::record_not_found(id)),
        }
    }

    /// Merge `data` into the stored record and write every declared field
    ///
    /// `id`, `created` and `updated` in `data` are ignored; `updated` is set
    /// to now.
    #[instrument(skip(self, data), fields(collection = %collection_name))]
    pub async fn update_record(
        &self,
        collection_name: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Record> {
        let collection = self.collection(collection_name)?;
        let mut record = self.find_record_by_id(collection_name, id).await?;

        for (key, value) in data {
            if !SYSTEM_COLUMNS.contains(&key.as_str()) {
                record.data.insert(key, value);
            }
        }
        record.data = project(&collection, record.data);

        let mut values = vec![("updated".to_string(), SqlValue::Text(now_timestamp()))];
        for field in &collection.fields {
            if let Some(value) = record.data.get(&field.name) {
                values.push((field.name.clone(), SqlValue::for_field(field.field_type, value)));
            }
        }

        let (sql, args) = QueryBuilder::table(collection_name)
            .and_where("\"id\" = ?", [SqlValue::from(id)])
            .build_update(&values, &["updated"]);
        let row = self
            .stmts
            .fetch_optional(&sql, &args)
            .await?
            .ok_or_else(|| VaultError::record_not_found(id))?;

        record.updated = text_column(&row, "updated")?;
        Ok(record)
    }

    #[instrument(skip(self), fields(collection = %collection_name))]
    pub async fn delete_record(&self, collection_name: &str, id: &str) -> Result<()> {
        self.collection(collection_name)?;

        let (sql, args) = QueryBuilder::table(collection_name)
            .and_where("\"id\" = ?", [SqlValue::from(id)])
            .build_delete();
        if self.stmts.execute(&sql, &args).await? == 0 {
            return Err(VaultError::record_not_found(id));
        }
        Ok(())
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// One page of records with optional filter, sort and relation expansion
    #[instrument(skip(self, params), fields(collection = %collection_name))]
    pub async fn list_records(
        &self,
        collection_name: &str,
        params: &ListParams,
    ) -> Result<RecordList> {
        let collection = self.collection(collection_name)?;

        let page = if params.page <= 0 { 1 } else { params.page };
        let per_page = if params.per_page <= 0 {
            self.default_per_page
        } else {
            params.per_page
        };

        let mut query = QueryBuilder::table(collection_name);
        if !params.filter.trim().is_empty() {
            let (condition, args) = parse_filter(&collection, &params.filter)?.to_condition();
            query = query.and_where(condition, args);
        }
        let sort = parse_sort(&collection, &params.sort)?;

        let (count_sql, count_args) = query.build_count();
        let total: i64 = match self.stmts.fetch_optional(&count_sql, &count_args).await? {
            Some(row) => row.try_get(0)?,
            None => 0,
        };

        let query = select_from(query, &collection)
            .order_by(&sort.field, sort.descending)
            .limit(per_page)
            .offset((page - 1).saturating_mul(per_page));
        let mut items = self.fetch_records(&collection, &query).await?;

        if !params.expand.trim().is_empty() {
            self.expand_records(&collection, &mut items, &params.expand)
                .await;
        }

        Ok(RecordList::new(page, per_page, total, items))
    }

    async fn fetch_records(
        &self,
        collection: &Collection,
        query: &QueryBuilder,
    ) -> Result<Vec<Record>> {
        let (sql, args) = query.build_select();
        let rows = self.stmts.fetch_all(&sql, &args).await?;
        rows.iter()
            .map(|row| decode_record(collection, row))
            .collect()
    }

    /// Resolve relation fields with one `id IN (…)` query per field
    ///
    /// Unknown fields, missing targets and failed lookups leave records
    /// unexpanded.
    async fn expand_records(&self, collection: &Collection, records: &mut [Record], expand: &str) {
        if records.is_empty() {
            return;
        }

        for field_name in expand.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some(target_name) = collection.field(field_name).and_then(|f| f.relation_target())
            else {
                debug!(field = field_name, "skipping expand of non-relation field");
                continue;
            };
            let Some(target) = self.registry.get_collection(target_name) else {
                debug!(field = field_name, target = target_name, "expand target not registered");
                continue;
            };

            let mut seen = HashSet::new();
            let ids: Vec<String> = records
                .iter()
                .filter_map(|r| r.data.get(field_name).and_then(Value::as_str))
                .filter(|id| !id.is_empty() && seen.insert(*id))
                .map(str::to_string)
                .collect();
            if ids.is_empty() {
                continue;
            }

            let (condition, args) = id_in(&ids);
            let query = select_all(&target).and_where(condition, args);
            let related = match self.fetch_records(&target, &query).await {
                Ok(related) => related,
                Err(e) => {
                    debug!(field = field_name, error = %e, "expand lookup failed");
                    continue;
                }
            };

            let by_id: HashMap<&str, &Record> =
                related.iter().map(|r| (r.id.as_str(), r)).collect();
            for record in records.iter_mut() {
                let resolved = record
                    .data
                    .get(field_name)
                    .and_then(Value::as_str)
                    .and_then(|id| by_id.get(id))
                    .map(|r| (*r).clone());
                if let Some(resolved) = resolved {
                    record.expand.insert(field_name.to_string(), resolved);
                }
            }
        }
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn select_all(collection: &Collection) -> QueryBuilder {
    select_from(QueryBuilder::table(&collection.name), collection)
}

/// System columns followed by declared fields in schema order
fn select_from(query: QueryBuilder, collection: &Collection) -> QueryBuilder {
    let columns = SYSTEM_COLUMNS
        .iter()
        .copied()
        .chain(collection.fields.iter().map(|f| f.name.as_str()));
    query.select(columns)
}

/// Keep only declared fields
fn project(collection: &Collection, mut data: Map<String, Value>) -> Map<String, Value> {
    let mut projected = Map::new();
    for field in &collection.fields {
        if let Some(value) = data.remove(&field.name) {
            projected.insert(field.name.clone(), value);
        }
    }
    projected
}

fn text_column(row: &SqliteRow, column: &str) -> Result<String> {
    Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
}

fn decode_record(collection: &Collection, row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new(&collection.name);
    record.id = text_column(row, "id")?;
    record.created = text_column(row, "created")?;
    record.updated = text_column(row, "updated")?;

    let offset = SYSTEM_COLUMNS.len();
    for (i, field) in collection.fields.iter().enumerate() {
        let value = decode_value(row, offset + i, field.field_type)?;
        record.data.insert(field.name.clone(), value);
    }
    Ok(record)
}

/// Decode a column by its runtime storage class, then shape it by field type
fn decode_value(row: &SqliteRow, index: usize, field_type: FieldType) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => {
            let i: i64 = row.try_get_unchecked(index)?;
            match field_type {
                FieldType::Bool => Value::Bool(i != 0),
                _ => Value::from(i),
            }
        }
        "REAL" | "NUMERIC" => {
            let f: f64 = row.try_get_unchecked(index)?;
            match field_type {
                FieldType::Bool => Value::Bool(f != 0.0),
                _ => number_value(f),
            }
        }
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => {
            let s: String = row.try_get_unchecked(index)?;
            match field_type {
                FieldType::Json => serde_json::from_str(&s).unwrap_or(Value::String(s)),
                _ => Value::String(s),
            }
        }
    };
    Ok(value)
}

/// Whole numbers come back as JSON integers
fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_F64 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}
