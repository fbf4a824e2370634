//! Stateless SQL assembly
//!
//! Identifiers are quoted here and every value becomes a `?` placeholder with
//! its [`SqlValue`] returned alongside the SQL text. Column order always
//! follows the caller's input, so the same logical query yields the same
//! string and can be looked up in the statement cache.

use serde_json::Value;

use crate::sql::sanitize::quote_identifier;
use crate::types::FieldType;

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    /// Plain JSON mapping; arrays and objects become their JSON text
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    /// Mapping for a value written into a column of `field_type`
    pub fn for_field(field_type: FieldType, value: &Value) -> Self {
        match (field_type, value) {
            (_, Value::Null) => SqlValue::Null,
            (FieldType::Json, v) => SqlValue::Text(v.to_string()),
            (FieldType::Number, Value::Number(n)) => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
            (FieldType::Bool, Value::Bool(b)) => SqlValue::Bool(*b),
            (_, v) => SqlValue::from_json(v),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

/// Fluent builder for one table's statements
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    columns: Vec<String>,
    conditions: Vec<String>,
    args: Vec<SqlValue>,
    order_by: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl QueryBuilder {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            conditions: Vec::new(),
            args: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    /// Columns to select; `*` when never called
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns = columns
            .into_iter()
            .map(|c| quote_identifier(c.as_ref()))
            .collect();
        self
    }

    /// Add a condition joined with AND
    ///
    /// `condition` must only contain quoted identifiers and `?` placeholders;
    /// its values go in `args`.
    pub fn and_where(
        mut self,
        condition: impl Into<String>,
        args: impl IntoIterator<Item = SqlValue>,
    ) -> Self {
        let condition = condition.into();
        if !condition.is_empty() {
            self.conditions.push(condition);
            self.args.extend(args);
        }
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        let direction = if descending { "DESC" } else { "ASC" };
        self.order_by = Some(format!("{} {}", quote_identifier(column), direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn build_select(&self) -> (String, Vec<SqlValue>) {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };

        let mut sql = format!(
            "SELECT {} FROM {}{}",
            columns,
            quote_identifier(&self.table),
            self.where_clause()
        );
        let mut args = self.args.clone();

        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            args.push(SqlValue::Integer(limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(" OFFSET ?");
            args.push(SqlValue::Integer(offset));
        }

        (sql, args)
    }

    pub fn build_count(&self) -> (String, Vec<SqlValue>) {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_identifier(&self.table),
            self.where_clause()
        );
        (sql, self.args.clone())
    }

    /// INSERT of `data` in the given order
    pub fn build_insert(
        &self,
        data: &[(String, SqlValue)],
        returning: &[&str],
    ) -> (String, Vec<SqlValue>) {
        let columns: Vec<String> = data.iter().map(|(c, _)| quote_identifier(c)).collect();
        let placeholders = vec!["?"; data.len()];

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );
        push_returning(&mut sql, returning);

        (sql, data.iter().map(|(_, v)| v.clone()).collect())
    }

    /// UPDATE setting `data` in the given order; WHERE args follow SET args
    pub fn build_update(
        &self,
        data: &[(String, SqlValue)],
        returning: &[&str],
    ) -> (String, Vec<SqlValue>) {
        let sets: Vec<String> = data
            .iter()
            .map(|(c, _)| format!("{} = ?", quote_identifier(c)))
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}{}",
            quote_identifier(&self.table),
            sets.join(", "),
            self.where_clause()
        );
        push_returning(&mut sql, returning);

        let mut args: Vec<SqlValue> = data.iter().map(|(_, v)| v.clone()).collect();
        args.extend(self.args.iter().cloned());
        (sql, args)
    }

    pub fn build_delete(&self) -> (String, Vec<SqlValue>) {
        let sql = format!(
            "DELETE FROM {}{}",
            quote_identifier(&self.table),
            self.where_clause()
        );
        (sql, self.args.clone())
    }
}

fn push_returning(sql: &mut String, returning: &[&str]) {
    if returning.is_empty() {
        return;
    }
    let cols: Vec<String> = returning.iter().map(|c| quote_identifier(c)).collect();
    sql.push_str(" RETURNING ");
    sql.push_str(&cols.join(", "));
}
