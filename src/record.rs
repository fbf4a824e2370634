//! Record and listing types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of a collection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub collection: String,
    /// Declared field name → value
    pub data: Map<String, Value>,
    /// Relation field name → resolved related record; never persisted
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expand: BTreeMap<String, Record>,
    pub created: String,
    pub updated: String,
}

impl Record {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Remove a field before the record leaves the engine (e.g. `password`)
    pub fn hide_field(&mut self, name: &str) {
        self.data.remove(name);
    }

    /// String value of `key`, empty when absent or not a string
    pub fn get_string(&self, key: &str) -> &str {
        self.data.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Integer value of `key`, truncating floats; 0 when absent
    pub fn get_int(&self, key: &str) -> i64 {
        match self.data.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Flat view used as the `record.*` rule context
    pub fn to_context_map(&self) -> Map<String, Value> {
        let mut map = self.data.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("created".to_string(), Value::String(self.created.clone()));
        map.insert("updated".to_string(), Value::String(self.updated.clone()));
        map
    }
}

/// Parameters for listing records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// 1-based page; values <= 0 mean 1
    pub page: i64,
    /// Page size; values <= 0 fall back to the configured default
    pub per_page: i64,
    /// `field` ascending or `-field` descending
    pub sort: String,
    /// Single comparison `field OP value`
    pub filter: String,
    /// Comma-separated relation fields to resolve
    pub expand: String,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: i64, per_page: i64) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = expand.into();
        self
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordList {
    pub page: i64,
    pub per_page: i64,
    /// Rows matching the filter across all pages
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<Record>,
}

impl RecordList {
    pub fn new(page: i64, per_page: i64, total_items: i64, items: Vec<Record>) -> Self {
        let total_pages = if per_page > 0 {
            total_items / per_page + i64::from(total_items % per_page != 0)
        } else {
            0
        };
        Self {
            page,
            per_page,
            total_items,
            total_pages,
            items,
        }
    }
}
