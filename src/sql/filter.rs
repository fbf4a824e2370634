//! Filter and sort parameters for list queries
//!
//! A filter is exactly one comparison `field OP value`. The field must be
//! `id` or a declared field of the collection; the value is always bound.

use crate::error::{Result, VaultError};
use crate::schema::Collection;
use crate::sql::builder::SqlValue;
use crate::sql::sanitize::quote_identifier;
use crate::types::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl FilterOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
        }
    }
}

/// Two-character operators come first so `>=` never reads as `>`
const OPERATORS: [(&str, FilterOp); 6] = [
    ("!=", FilterOp::NotEq),
    (">=", FilterOp::Gte),
    ("<=", FilterOp::Lte),
    ("=", FilterOp::Eq),
    (">", FilterOp::Gt),
    ("<", FilterOp::Lt),
];

/// A validated single-comparison filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: SqlValue,
}

impl Filter {
    /// WHERE fragment and its bound argument
    pub fn to_condition(&self) -> (String, Vec<SqlValue>) {
        (
            format!("{} {} ?", quote_identifier(&self.field), self.op.as_sql()),
            vec![self.value.clone()],
        )
    }
}

/// Locate the earliest operator in `input`
fn find_operator(input: &str) -> Option<(usize, &'static str, FilterOp)> {
    for pos in 0..input.len() {
        if !input.is_char_boundary(pos) {
            continue;
        }
        let rest = &input[pos..];
        if let Some((token, op)) = OPERATORS.iter().find(|(token, _)| rest.starts_with(token)) {
            return Some((pos, token, *op));
        }
    }
    None
}

/// Parse and validate a filter against `collection`
pub fn parse_filter(collection: &Collection, filter: &str) -> Result<Filter> {
    let (pos, token, op) = find_operator(filter).ok_or_else(|| {
        VaultError::UnsupportedFilter(
            "Filter format not supported. Use 'field OP value' with one of = != > < >= <="
                .to_string(),
        )
    })?;

    let field = filter[..pos].trim();
    let raw_value = filter[pos + token.len()..].trim().trim_matches('\'');

    let field_type = if field == "id" {
        FieldType::Text
    } else {
        collection
            .field(field)
            .map(|f| f.field_type)
            .ok_or_else(|| VaultError::InvalidFilter(field.to_string()))?
    };

    Ok(Filter {
        field: field.to_string(),
        op,
        value: coerce(field_type, raw_value),
    })
}

/// Match SQLite's storage class for the column so comparisons behave
fn coerce(field_type: FieldType, raw: &str) -> SqlValue {
    match field_type {
        FieldType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => SqlValue::Integer(1),
            "false" | "0" => SqlValue::Integer(0),
            _ => SqlValue::Text(raw.to_string()),
        },
        FieldType::Number => raw
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
        _ => SqlValue::Text(raw.to_string()),
    }
}

/// `id IN (?, ?, …)` over a set of ids; empty sets match nothing
pub(crate) fn id_in(ids: &[String]) -> (String, Vec<SqlValue>) {
    if ids.is_empty() {
        return ("0 = 1".to_string(), Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    (
        format!("\"id\" IN ({})", placeholders),
        ids.iter().cloned().map(SqlValue::Text).collect(),
    )
}

/// A validated sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: "created".to_string(),
            descending: true,
        }
    }
}

/// Parse `field` / `-field`; empty means `created DESC`
pub fn parse_sort(collection: &Collection, sort: &str) -> Result<Sort> {
    let sort = sort.trim();
    if sort.is_empty() {
        return Ok(Sort::default());
    }

    let (field, descending) = match sort.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (sort, false),
    };

    let known = matches!(field, "id" | "created" | "updated") || collection.has_field(field);
    if !known {
        return Err(VaultError::InvalidSort(field.to_string()));
    }

    Ok(Sort {
        field: field.to_string(),
        descending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;

    fn posts() -> Collection {
        Collection::new("posts")
            .with_field(Field::new("title", FieldType::Text))
            .with_field(Field::new("views", FieldType::Number))
            .with_field(Field::new("published", FieldType::Bool))
    }

    // ==================== Operator Detection ====================

    #[test]
    fn test_parse_each_operator() {
        let c = posts();
        let cases = [
            ("views = 3", FilterOp::Eq),
            ("views != 3", FilterOp::NotEq),
            ("views > 3", FilterOp::Gt),
            ("views < 3", FilterOp::Lt),
            ("views >= 3", FilterOp::Gte),
            ("views <= 3", FilterOp::Lte),
        ];
        for (input, op) in cases {
            let filter = parse_filter(&c, input).unwrap();
            assert_eq!(filter.op, op, "{}", input);
            assert_eq!(filter.field, "views");
            assert_eq!(filter.value, SqlValue::Real(3.0));
        }
    }

    #[test]
    fn test_earliest_operator_wins() {
        let filter = parse_filter(&posts(), "title = a >= b").unwrap();
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value, SqlValue::Text("a >= b".into()));
    }

    #[test]
    fn test_no_spaces_needed() {
        let filter = parse_filter(&posts(), "title='Hello'").unwrap();
        assert_eq!(filter.value, SqlValue::Text("Hello".into()));
    }

    #[test]
    fn test_no_operator_is_unsupported() {
        let err = parse_filter(&posts(), "title like x").unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FILTER");
    }

    // ==================== Whitelist ====================

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_filter(&posts(), "secret_internal_col = x").unwrap_err();
        assert!(matches!(err, VaultError::InvalidFilter(ref f) if f == "secret_internal_col"));
    }

    #[test]
    fn test_id_allowed() {
        let filter = parse_filter(&posts(), "id = 'abc'").unwrap();
        assert_eq!(filter.field, "id");
        assert_eq!(filter.value, SqlValue::Text("abc".into()));
    }

    #[test]
    fn test_injection_payload_becomes_one_value() {
        let filter = parse_filter(&posts(), "title = '); DROP TABLE posts; --").unwrap();
        let (sql, args) = filter.to_condition();
        assert_eq!(sql, "\"title\" = ?");
        assert_eq!(args, vec![SqlValue::Text("); DROP TABLE posts; --".into())]);
    }

    #[test]
    fn test_injection_in_field_position_rejected() {
        let err = parse_filter(&posts(), "title OR 1 = 1").unwrap_err();
        assert_eq!(err.code(), "INVALID_FILTER");
    }

    // ==================== Coercion ====================

    #[test]
    fn test_bool_coercion() {
        let c = posts();
        assert_eq!(
            parse_filter(&c, "published = true").unwrap().value,
            SqlValue::Integer(1)
        );
        assert_eq!(
            parse_filter(&c, "published = 0").unwrap().value,
            SqlValue::Integer(0)
        );
        assert_eq!(
            parse_filter(&c, "published = maybe").unwrap().value,
            SqlValue::Text("maybe".into())
        );
    }

    #[test]
    fn test_number_coercion_falls_back_to_text() {
        assert_eq!(
            parse_filter(&posts(), "views > many").unwrap().value,
            SqlValue::Text("many".into())
        );
    }

    // ==================== id IN ====================

    #[test]
    fn test_id_in() {
        let (sql, args) = id_in(&["a".into(), "b".into()]);
        assert_eq!(sql, "\"id\" IN (?, ?)");
        assert_eq!(args.len(), 2);

        let (sql, args) = id_in(&[]);
        assert_eq!(sql, "0 = 1");
        assert!(args.is_empty());
    }

    // ==================== Sort ====================

    #[test]
    fn test_sort_default() {
        assert_eq!(parse_sort(&posts(), "").unwrap(), Sort::default());
    }

    #[test]
    fn test_sort_directions() {
        let asc = parse_sort(&posts(), "title").unwrap();
        assert!(!asc.descending);
        let desc = parse_sort(&posts(), "-views").unwrap();
        assert!(desc.descending);
        assert_eq!(desc.field, "views");
        assert!(parse_sort(&posts(), "-updated").is_ok());
    }

    #[test]
    fn test_sort_unknown_field() {
        let err = parse_sort(&posts(), "-secret; DROP TABLE posts").unwrap_err();
        assert_eq!(err.code(), "INVALID_SORT");
    }
}
