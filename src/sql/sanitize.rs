//! SQL identifier validation and quoting
//!
//! Collection and field names end up inside SQL text, so every name is
//! validated once when a collection is defined and quoted at every use.

use std::sync::LazyLock;

use regex::Regex;

/// SQLite keywords that may not be used as collection or field names
pub const SQLITE_RESERVED_WORDS: &[&str] = &[
    "ADD",
    "ALL",
    "ALTER",
    "AND",
    "AS",
    "AUTOINCREMENT",
    "BETWEEN",
    "CASE",
    "CHECK",
    "COLLATE",
    "COMMIT",
    "CONSTRAINT",
    "CREATE",
    "DEFAULT",
    "DEFERRABLE",
    "DELETE",
    "DISTINCT",
    "DROP",
    "ELSE",
    "ESCAPE",
    "EXCEPT",
    "EXISTS",
    "FOREIGN",
    "FROM",
    "GROUP",
    "HAVING",
    "IN",
    "INDEX",
    "INSERT",
    "INTERSECT",
    "INTO",
    "IS",
    "ISNULL",
    "JOIN",
    "LIMIT",
    "NOT",
    "NOTHING",
    "NOTNULL",
    "NULL",
    "ON",
    "OR",
    "ORDER",
    "PRIMARY",
    "REFERENCES",
    "RETURNING",
    "SELECT",
    "SET",
    "TABLE",
    "THEN",
    "TO",
    "TRANSACTION",
    "UNION",
    "UNIQUE",
    "UPDATE",
    "USING",
    "VALUES",
    "WHEN",
    "WHERE",
];

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Example
/// ```
/// use vault_collections::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("tasks"), "\"tasks\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate a collection or field name
///
/// Rules:
/// - Must start with a letter or underscore
/// - Can only contain ASCII letters, digits and underscores
/// - Cannot be a SQLite reserved word or use the `sqlite_` prefix
/// - Cannot be one of `reserved_columns`
///
/// # Example
/// ```
/// use vault_collections::sql::validate_identifier;
///
/// assert!(validate_identifier("tasks", &[]).is_ok());
/// assert!(validate_identifier("lastLogin", &[]).is_ok());
/// assert!(validate_identifier("select", &[]).is_err());
/// assert!(validate_identifier("id", &["id", "created", "updated"]).is_err());
/// ```
pub fn validate_identifier(name: &str, reserved_columns: &[&str]) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if !IDENTIFIER_RE.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a letter or underscore and contain only letters, numbers, and underscores.",
            name
        ));
    }

    let upper = name.to_uppercase();
    if SQLITE_RESERVED_WORDS.contains(&upper.as_str()) {
        return Err(format!(
            "Identifier '{}' is a SQLite reserved keyword and cannot be used.",
            name
        ));
    }

    if upper.starts_with("SQLITE_") {
        return Err(format!(
            "Identifier '{}' uses the reserved 'sqlite_' prefix.",
            name
        ));
    }

    if reserved_columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        return Err(format!(
            "Column name '{}' is reserved and cannot be used.",
            name
        ));
    }

    Ok(())
}
