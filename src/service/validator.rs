//! Record payload validation

use serde_json::{Map, Value};

use crate::error::{Result, VaultError};
use crate::schema::Collection;
use crate::types::FieldType;

/// Check required fields and basic types against the collection
///
/// Every offending field is reported in the error details, not just the
/// first one.
pub fn validate_record(collection: &Collection, data: &Map<String, Value>) -> Result<()> {
    let mut details = Map::new();

    for field in &collection.fields {
        let value = data.get(&field.name);

        let missing = match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if field.required && missing {
            details.insert(field.name.clone(), Value::from("this field is required"));
            continue;
        }

        let Some(value) = value.filter(|v| !v.is_null()) else {
            continue;
        };
        let problem = match field.field_type {
            FieldType::Number if !value.is_number() => Some("must be a number"),
            FieldType::Bool if !value.is_boolean() => Some("must be a boolean"),
            _ => None,
        };
        if let Some(problem) = problem {
            details.insert(field.name.clone(), Value::from(problem));
        }
    }

    if details.is_empty() {
        Ok(())
    } else {
        Err(VaultError::validation("Data validation failed", details))
    }
}
