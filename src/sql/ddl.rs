//! DDL generation for collection tables
//!
//! Generates SQLite DDL statements. Migrations are additive only, so there is
//! no statement for dropping or retyping a column.

use crate::schema::Collection;
use crate::sql::sanitize::quote_identifier;
use crate::types::Field;

/// RFC 3339 UTC format used for `created` / `updated`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// SQL expression producing the current UTC timestamp
pub const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

/// DDL generator bound to one collection's table
pub struct DdlGenerator<'a> {
    table: &'a str,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(table: &'a str) -> Self {
        Self { table }
    }

    pub fn for_collection(collection: &'a Collection) -> Self {
        Self::new(&collection.name)
    }

    /// Generate CREATE TABLE with the system columns followed by every field
    pub fn generate_create_table(&self, fields: &[Field]) -> String {
        let mut column_defs = vec![
            "\"id\" TEXT PRIMARY KEY".to_string(),
            format!("\"created\" TEXT DEFAULT ({})", NOW_SQL),
            format!("\"updated\" TEXT DEFAULT ({})", NOW_SQL),
        ];

        for field in fields {
            column_defs.push(Self::format_column_definition(field));
        }

        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(self.table),
            column_defs.join(", ")
        )
    }

    /// ALTER TABLE ADD COLUMN for a newly declared field
    ///
    /// Only the type is carried; SQLite refuses NOT NULL without a default on
    /// populated tables, and UNIQUE is not allowed in ADD COLUMN.
    pub fn generate_add_column(&self, field: &Field) -> String {
        self.generate_add_raw_column(&field.name, field.field_type.to_sql_type())
    }

    /// ALTER TABLE ADD COLUMN for a system column such as `created`
    pub fn generate_add_raw_column(&self, column: &str, sql_type: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_identifier(self.table),
            quote_identifier(column),
            sql_type
        )
    }

    /// Copy a legacy timestamp column (unix epoch or text) into `column`
    pub fn generate_backfill_from(&self, column: &str, legacy: &str) -> String {
        let target = quote_identifier(column);
        let source = quote_identifier(legacy);
        format!(
            "UPDATE {table} SET {target} = COALESCE(strftime('{fmt}', {source}, 'unixepoch'), strftime('{fmt}', {source}), '') WHERE {target} IS NULL OR {target} = ''",
            table = quote_identifier(self.table),
            target = target,
            source = source,
            fmt = TIMESTAMP_FORMAT,
        )
    }

    /// Stamp "now" on rows whose `column` is still empty
    pub fn generate_fill_now(&self, column: &str) -> String {
        let target = quote_identifier(column);
        format!(
            "UPDATE {} SET {} = {} WHERE {} IS NULL OR {} = ''",
            quote_identifier(self.table),
            target,
            NOW_SQL,
            target,
            target
        )
    }

    /// Name of the index covering `columns`: `idx_<table>_<c1>_<c2>`
    pub fn index_name(&self, columns: &[String]) -> String {
        format!("idx_{}_{}", self.table, columns.join("_"))
    }

    /// CREATE INDEX IF NOT EXISTS over the given columns
    pub fn generate_create_index(&self, columns: &[String]) -> String {
        let quoted_columns: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();

        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_identifier(&self.index_name(columns)),
            quote_identifier(self.table),
            quoted_columns.join(", ")
        )
    }

    pub fn generate_drop_table(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_identifier(self.table))
    }

    /// Format a single column definition for CREATE TABLE
    pub fn format_column_definition(field: &Field) -> String {
        let mut parts = vec![
            quote_identifier(&field.name),
            field.field_type.to_sql_type().to_string(),
        ];

        if field.required {
            parts.push("NOT NULL".to_string());
        }

        if field.unique {
            parts.push("UNIQUE".to_string());
        }

        parts.join(" ")
    }
}
