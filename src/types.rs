//! Core type definitions for collection schemas
//!
//! Includes field types, field definitions and collection kinds.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current UTC time as RFC 3339 with second precision (`2024-05-01T12:00:00Z`)
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Field Types
// ============================================================================

/// Declared type of a collection field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text (TEXT)
    Text,
    /// Floating point number (REAL)
    Number,
    /// Boolean stored as 0/1 (INTEGER)
    Bool,
    /// Arbitrary JSON document serialized to TEXT
    Json,
    /// RFC 3339 timestamp string (TEXT)
    Date,
    /// Id of a record in another collection (TEXT)
    Relation,
    /// Stored file reference (TEXT)
    File,
}

impl FieldType {
    /// SQLite storage type for this field
    pub fn to_sql_type(self) -> &'static str {
        match self {
            FieldType::Number => "REAL",
            FieldType::Bool => "INTEGER",
            FieldType::Text
            | FieldType::Json
            | FieldType::Date
            | FieldType::Relation
            | FieldType::File => "TEXT",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Json => "json",
            FieldType::Date => "date",
            FieldType::Relation => "relation",
            FieldType::File => "file",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Field Definition
// ============================================================================

/// Field definition for a dynamic collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    /// Column name (must be a valid identifier)
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// NOT NULL on create; non-empty on service-level validation
    #[serde(default)]
    pub required: bool,

    /// Whether the column has a UNIQUE constraint
    #[serde(default)]
    pub unique: bool,

    /// Free-form options; relation fields carry `{"collection": "<target>"}`
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

impl Field {
    /// Create a new optional, non-unique field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            options: Value::Null,
        }
    }

    /// Relation field pointing at `target` collection
    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldType::Relation)
            .with_options(serde_json::json!({ "collection": target.into() }))
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Target collection of a relation field
    pub fn relation_target(&self) -> Option<&str> {
        if self.field_type != FieldType::Relation {
            return None;
        }
        self.options
            .get("collection")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Collection Type
// ============================================================================

/// Kind of collection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    #[default]
    Base,
    Auth,
    System,
}

impl CollectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionType::Base => "base",
            CollectionType::Auth => "auth",
            CollectionType::System => "system",
        }
    }

    /// Parse a stored type string, falling back to `Base`
    pub fn parse(s: &str) -> Self {
        match s {
            "auth" => CollectionType::Auth,
            "system" => CollectionType::System,
            _ => CollectionType::Base,
        }
    }
}
