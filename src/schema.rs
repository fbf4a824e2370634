//! Collection definitions
//!
//! A `Collection` is the declarative description of one SQL table: its fields,
//! indexes and the five per-operation access rules.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::sql::sanitize::validate_identifier;
use crate::types::{CollectionType, Field};

/// Column names every collection table carries and no field may redeclare
pub const SYSTEM_COLUMNS: &[&str] = &["id", "created", "updated"];

/// Record operation guarded by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    List,
    View,
    Create,
    Update,
    Delete,
}

impl RuleAction {
    pub const ALL: [RuleAction; 5] = [
        RuleAction::List,
        RuleAction::View,
        RuleAction::Create,
        RuleAction::Update,
        RuleAction::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::List => "list",
            RuleAction::View => "view",
            RuleAction::Create => "create",
            RuleAction::Update => "update",
            RuleAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection metadata stored in the metadata table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    /// Identifier (defaults to `col_<name>` when persisted)
    #[serde(default)]
    pub id: String,
    /// Unique name, also the SQL table name
    pub name: String,
    #[serde(rename = "type", default)]
    pub collection_type: CollectionType,
    /// Ordered field list
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Index specs, each a comma-separated list of field names
    #[serde(default)]
    pub indexes: Vec<String>,

    /// `None` or empty means public
    #[serde(default)]
    pub list_rule: Option<String>,
    #[serde(default)]
    pub view_rule: Option<String>,
    #[serde(default)]
    pub create_rule: Option<String>,
    #[serde(default)]
    pub update_rule: Option<String>,
    #[serde(default)]
    pub delete_rule: Option<String>,

    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl Collection {
    /// Create a new base collection without fields or rules
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            collection_type: CollectionType::Base,
            fields: Vec::new(),
            indexes: Vec::new(),
            list_rule: None,
            view_rule: None,
            create_rule: None,
            update_rule: None,
            delete_rule: None,
            created: String::new(),
            updated: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_type(mut self, collection_type: CollectionType) -> Self {
        self.collection_type = collection_type;
        self
    }

    /// Append a field
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    /// Add an index spec such as `"owner,done"`
    pub fn with_index(mut self, spec: impl Into<String>) -> Self {
        self.indexes.push(spec.into());
        self
    }

    /// Set the rule for one operation
    pub fn with_rule(mut self, action: RuleAction, rule: impl Into<String>) -> Self {
        *self.rule_slot(action) = Some(rule.into());
        self
    }

    /// Set the same rule on all five operations
    pub fn with_all_rules(mut self, rule: impl Into<String>) -> Self {
        let rule = rule.into();
        for action in RuleAction::ALL {
            *self.rule_slot(action) = Some(rule.clone());
        }
        self
    }

    /// Rule guarding `action`, if any
    pub fn rule(&self, action: RuleAction) -> Option<&str> {
        match action {
            RuleAction::List => self.list_rule.as_deref(),
            RuleAction::View => self.view_rule.as_deref(),
            RuleAction::Create => self.create_rule.as_deref(),
            RuleAction::Update => self.update_rule.as_deref(),
            RuleAction::Delete => self.delete_rule.as_deref(),
        }
    }

    fn rule_slot(&mut self, action: RuleAction) -> &mut Option<String> {
        match action {
            RuleAction::List => &mut self.list_rule,
            RuleAction::View => &mut self.view_rule,
            RuleAction::Create => &mut self.create_rule,
            RuleAction::Update => &mut self.update_rule,
            RuleAction::Delete => &mut self.delete_rule,
        }
    }

    /// Look up a declared field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True when `name` is a declared field (system columns excluded)
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Check the collection name, field names and index specs
    ///
    /// Runs before any migration or query touches the collection, since these
    /// names end up in SQL text.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, &[]).map_err(VaultError::InvalidIdentifier)?;

        // SQLite column names are case-insensitive
        let mut seen = HashSet::new();
        for field in &self.fields {
            validate_identifier(&field.name, SYSTEM_COLUMNS)
                .map_err(VaultError::InvalidIdentifier)?;
            if !seen.insert(field.name.to_ascii_lowercase()) {
                return Err(VaultError::invalid_identifier(format!(
                    "Duplicate field '{}' in collection '{}'",
                    field.name, self.name
                )));
            }
        }

        for columns in self.index_columns() {
            for column in &columns {
                let column_lower = column.to_ascii_lowercase();
                if !SYSTEM_COLUMNS.contains(&column_lower.as_str()) && !seen.contains(&column_lower) {
                    return Err(VaultError::invalid_identifier(format!(
                        "Index on '{}' references unknown field '{}'",
                        self.name, column
                    )));
                }
            }
        }

        Ok(())
    }

    /// Index specs split into trimmed field-name lists
    pub fn index_columns(&self) -> Vec<Vec<String>> {
        self.indexes
            .iter()
            .map(|spec| {
                spec.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|cols| !cols.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn tasks() -> Collection {
        Collection::new("tasks")
            .with_field(Field::new("title", FieldType::Text).required())
            .with_field(Field::new("done", FieldType::Bool))
            .with_field(Field::relation("owner", "users"))
            .with_index("owner, done")
            .with_rule(RuleAction::List, "owner = @request.auth.id")
    }

    #[test]
    fn test_builder_defaults() {
        let c = Collection::new("posts");
        assert_eq!(c.name, "posts");
        assert_eq!(c.collection_type, CollectionType::Base);
        assert!(c.fields.is_empty());
        for action in RuleAction::ALL {
            assert!(c.rule(action).is_none());
        }
    }

    #[test]
    fn test_rule_lookup_per_action() {
        let c = tasks();
        assert_eq!(c.rule(RuleAction::List), Some("owner = @request.auth.id"));
        assert_eq!(c.rule(RuleAction::Delete), None);
    }

    #[test]
    fn test_with_all_rules() {
        let c = Collection::new("x").with_all_rules("@request.auth.id != ''");
        for action in RuleAction::ALL {
            assert_eq!(c.rule(action), Some("@request.auth.id != ''"));
        }
    }

    #[test]
    fn test_field_lookup() {
        let c = tasks();
        assert_eq!(c.field("done").map(|f| f.field_type), Some(FieldType::Bool));
        assert!(c.has_field("owner"));
        assert!(!c.has_field("id"));
        assert!(!c.has_field("secret"));
    }

    #[test]
    fn test_index_columns_are_trimmed() {
        let c = tasks().with_index(" , ");
        assert_eq!(
            c.index_columns(),
            vec![vec!["owner".to_string(), "done".to_string()]]
        );
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(tasks().validate().is_ok());
        assert!(tasks().with_index("created").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(Collection::new("bad name").validate().is_err());
        assert!(Collection::new("select").validate().is_err());

        let reserved = Collection::new("x").with_field(Field::new("created", FieldType::Date));
        assert_eq!(reserved.validate().unwrap_err().code(), "INVALID_IDENTIFIER");

        let hostile = Collection::new("x").with_field(Field::new("a\"; DROP", FieldType::Text));
        assert!(hostile.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_unknown_index_columns() {
        let dup = Collection::new("x")
            .with_field(Field::new("a", FieldType::Text))
            .with_field(Field::new("a", FieldType::Number));
        assert!(dup.validate().is_err());

        let bad_index = tasks().with_index("nope");
        assert!(bad_index.validate().is_err());
    }

    #[test]
    fn test_validate_compares_columns_ignoring_case() {
        let shadow = tasks().with_field(Field::new("Created", FieldType::Text));
        assert_eq!(shadow.validate().unwrap_err().code(), "INVALID_IDENTIFIER");

        let dup = Collection::new("x")
            .with_field(Field::new("title", FieldType::Text))
            .with_field(Field::new("Title", FieldType::Text));
        assert!(dup.validate().is_err());

        assert!(tasks().with_index("Owner").validate().is_ok());
    }

    #[test]
    fn test_collection_json_uses_snake_case_rules() {
        let value = serde_json::to_value(tasks()).unwrap();
        assert_eq!(value["type"], "base");
        assert_eq!(value["list_rule"], "owner = @request.auth.id");
        assert!(value["view_rule"].is_null());
    }
}
