//! Error types for the collection engine
//!
//! Every error carries a machine-readable code (`VaultError::code`), a human
//! message (`Display`) and optional structured details (`VaultError::details`).

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::rules::{EvalError, ParseError};

/// Errors that can occur during collection engine operations
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        /// Offending field name → reason
        fields: Map<String, Value>,
    },

    #[error("Invalid filter: unknown field '{0}'")]
    InvalidFilter(String),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Invalid sort field: {0}")]
    InvalidSort(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Record ID is required")]
    MissingId,

    #[error("Migration failed during {operation} on '{target}': {source}")]
    MigrationFailed {
        operation: &'static str,
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Rule parse error: {0}")]
    RuleParse(#[from] ParseError),

    #[error("Rule evaluation error: {0}")]
    RuleEval(#[from] EvalError),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Hook rejected operation: {0}")]
    Hook(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[source] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::Conflict(db_err.message().to_string());
            }
        }
        Self::Sql(err)
    }
}

impl VaultError {
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound(name.into())
    }

    pub fn record_not_found(id: impl Into<String>) -> Self {
        Self::RecordNotFound(id.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn hook(msg: impl Into<String>) -> Self {
        Self::Hook(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Self::InvalidIdentifier(msg.into())
    }

    /// Validation failure with per-field reasons
    pub fn validation(message: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
            fields,
        }
    }

    pub(crate) fn migration(
        operation: &'static str,
        target: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::MigrationFailed {
            operation,
            target: target.into(),
            source,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            Self::RecordNotFound(_) => "RECORD_NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::UnsupportedFilter(_) => "UNSUPPORTED_FILTER",
            Self::InvalidSort(_) => "INVALID_SORT",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::MissingId => "MISSING_ID",
            Self::MigrationFailed { .. } => "MIGRATION_FAILED",
            Self::RuleParse(_) => "RULE_PARSE_ERROR",
            Self::RuleEval(_) => "RULE_EVAL_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Hook(_) => "HOOK_FAILED",
            Self::Database(_) | Self::Sql(_) => "DATABASE_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Structured context for observability
    pub fn details(&self) -> Map<String, Value> {
        let value = match self {
            Self::ValidationFailed { fields, .. } => Value::Object(fields.clone()),
            Self::InvalidFilter(field) | Self::InvalidSort(field) => json!({ "field": field }),
            Self::MigrationFailed {
                operation,
                target,
                source,
            } => json!({
                "operation": operation,
                "target": target,
                "error": source.to_string(),
            }),
            Self::Sql(err) => json!({ "error": err.to_string() }),
            _ => Value::Null,
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// True for errors that mean "the thing asked for does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CollectionNotFound(_) | Self::RecordNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
