//! Rule evaluation against an auth / data / record context

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use super::ast::{Expr, InfixOp};
use super::parser::{self, ParseError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("type mismatch for {0}: both operands must be booleans")]
    TypeMismatch(&'static str),

    #[error("cannot convert {0} to number")]
    NotANumber(String),

    #[error("rule did not evaluate to a boolean")]
    NotBoolean,
}

/// Either half of a failed evaluation; callers treat both as deny
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("eval error: {0}")]
    Eval(#[from] EvalError),
}

/// Inputs a rule can reference
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    /// Authenticated identity, `@request.auth.*`
    pub auth: Map<String, Value>,
    /// Incoming payload, `@request.data.*`
    pub data: Map<String, Value>,
    /// Stored record, `record.*` and bare names
    pub record: Map<String, Value>,
    pub is_admin: bool,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for an administrator; every rule passes
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: Map<String, Value>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_record(mut self, record: Map<String, Value>) -> Self {
        self.record = record;
        self
    }

    /// Auth map holding only an `id`
    pub fn authenticated(id: impl Into<String>) -> Self {
        let mut auth = Map::new();
        auth.insert("id".to_string(), Value::String(id.into()));
        Self::new().with_auth(auth)
    }

    fn resolve(&self, key: &str) -> RuleValue {
        let (source, field) = if let Some(field) = key.strip_prefix("@request.auth.") {
            (&self.auth, field)
        } else if let Some(field) = key.strip_prefix("@request.data.") {
            (&self.data, field)
        } else if let Some(field) = key.strip_prefix("record.") {
            (&self.record, field)
        } else {
            (&self.record, key)
        };

        source.get(field).map_or(RuleValue::Null, RuleValue::from_json)
    }
}

/// Runtime value of a rule sub-expression
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
}

impl RuleValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RuleValue::Null,
            Value::Bool(b) => RuleValue::Bool(*b),
            Value::String(s) => RuleValue::String(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RuleValue::Integer(i),
                None => RuleValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            // Composite values only take part in equality, via their JSON text
            other => RuleValue::String(other.to_string()),
        }
    }

    fn as_f64(&self) -> Result<f64, EvalError> {
        match self {
            RuleValue::Integer(i) => Ok(*i as f64),
            RuleValue::Number(n) => Ok(*n),
            other => Err(EvalError::NotANumber(format!("{:?}", other))),
        }
    }

    fn as_bool(&self, op: &'static str) -> Result<bool, EvalError> {
        match self {
            RuleValue::Bool(b) => Ok(*b),
            _ => Err(EvalError::TypeMismatch(op)),
        }
    }
}

/// String form used by `=` and `!=`; `Null` renders empty
impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::Null => Ok(()),
            RuleValue::String(s) => f.write_str(s),
            RuleValue::Integer(i) => write!(f, "{}", i),
            RuleValue::Number(n) => write!(f, "{}", n),
            RuleValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Evaluate `rule` in `ctx`
///
/// Admins always pass, and an empty rule is public. Any error must be
/// treated as deny by the caller.
pub fn evaluate(rule: &str, ctx: &EvaluationContext) -> Result<bool, RuleError> {
    if ctx.is_admin {
        return Ok(true);
    }

    if rule.is_empty() {
        return Ok(true);
    }

    // A rule of only whitespace is not empty; the parser rejects it
    let rule = rule.trim();
    match rule {
        "true" => return Ok(true),
        "false" => return Ok(false),
        _ => {}
    }

    let expr = parser::parse(rule)?;
    match eval_expr(&expr, ctx)? {
        RuleValue::Bool(b) => Ok(b),
        _ => Err(EvalError::NotBoolean.into()),
    }
}

/// Evaluate an already parsed expression to its value
pub fn eval_expr(expr: &Expr, ctx: &EvaluationContext) -> Result<RuleValue, EvalError> {
    match expr {
        Expr::Identifier(name) => Ok(ctx.resolve(name)),
        Expr::StringLiteral(s) => Ok(RuleValue::String(s.clone())),
        Expr::IntegerLiteral(i) => Ok(RuleValue::Integer(*i)),
        Expr::BooleanLiteral(b) => Ok(RuleValue::Bool(*b)),
        Expr::Infix { left, op, right } => {
            let left = eval_expr(left, ctx)?;
            let right = eval_expr(right, ctx)?;
            apply(*op, &left, &right)
        }
    }
}

fn apply(op: InfixOp, left: &RuleValue, right: &RuleValue) -> Result<RuleValue, EvalError> {
    let result = match op {
        InfixOp::Eq => left.to_string() == right.to_string(),
        InfixOp::NotEq => left.to_string() != right.to_string(),
        InfixOp::And => {
            let l = left.as_bool("&&")?;
            let r = right.as_bool("&&")?;
            l && r
        }
        InfixOp::Or => {
            let l = left.as_bool("||")?;
            let r = right.as_bool("||")?;
            l || r
        }
        InfixOp::Gt => left.as_f64()? > right.as_f64()?,
        InfixOp::Lt => left.as_f64()? < right.as_f64()?,
        InfixOp::Gte => left.as_f64()? >= right.as_f64()?,
        InfixOp::Lte => left.as_f64()? <= right.as_f64()?,
    };
    Ok(RuleValue::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn owner_ctx(auth_id: &str, owner: Value) -> EvaluationContext {
        EvaluationContext::authenticated(auth_id).with_record(map(json!({ "owner": owner })))
    }

    // ==================== Short Circuits ====================

    #[test]
    fn test_empty_rule_is_public() {
        assert_eq!(evaluate("", &EvaluationContext::new()), Ok(true));
    }

    #[test]
    fn test_blank_rule_is_denied() {
        assert!(evaluate("   ", &EvaluationContext::new()).is_err());
        assert!(evaluate("\t\n", &EvaluationContext::authenticated("u1")).is_err());
        assert_eq!(evaluate("  true ", &EvaluationContext::new()), Ok(true));
    }

    #[test]
    fn test_admin_bypasses_everything() {
        assert_eq!(evaluate("false", &EvaluationContext::admin()), Ok(true));
        assert_eq!(evaluate("a && 1", &EvaluationContext::admin()), Ok(true));
    }

    #[test]
    fn test_literal_rules() {
        let ctx = EvaluationContext::new();
        assert_eq!(evaluate(" true ", &ctx), Ok(true));
        assert_eq!(evaluate("false", &ctx), Ok(false));
    }

    // ==================== Ownership ====================

    #[test]
    fn test_owner_matches() {
        let rule = "@request.auth.id = record.owner";
        assert_eq!(evaluate(rule, &owner_ctx("u1", json!("u1"))), Ok(true));
        assert_eq!(evaluate(rule, &owner_ctx("u1", json!("u2"))), Ok(false));
    }

    #[test]
    fn test_equality_compares_string_forms() {
        let rule = "@request.auth.id = record.owner";
        assert_eq!(evaluate(rule, &owner_ctx("5", json!(5))), Ok(true));
        assert_eq!(evaluate(rule, &owner_ctx("5", json!(5.0))), Ok(true));

        let done = EvaluationContext::new().with_record(map(json!({"done": true})));
        assert_eq!(evaluate("record.done = true", &done), Ok(true));
    }

    #[test]
    fn test_bare_identifier_reads_record() {
        let ctx = owner_ctx("u1", json!("u1"));
        assert_eq!(evaluate("owner = 'u1'", &ctx), Ok(true));
    }

    #[test]
    fn test_request_data_lookup() {
        let ctx = EvaluationContext::new().with_data(map(json!({"status": "draft"})));
        assert_eq!(evaluate("@request.data.status = 'draft'", &ctx), Ok(true));
        assert_eq!(evaluate("@request.data.status != \"draft\"", &ctx), Ok(false));
    }

    // ==================== Anonymous Access ====================

    #[test]
    fn test_anonymous_denied_by_auth_check() {
        let rule = "@request.auth.id != ''";
        assert_eq!(evaluate(rule, &EvaluationContext::new()), Ok(false));
        assert_eq!(evaluate(rule, &EvaluationContext::authenticated("u1")), Ok(true));
    }

    // ==================== Boolean Operators ====================

    #[test]
    fn test_and_or() {
        let ctx = owner_ctx("u1", json!("u1"));
        assert_eq!(evaluate("owner = 'u1' && 1 = 1", &ctx), Ok(true));
        assert_eq!(evaluate("owner = 'x' || 1 = 1", &ctx), Ok(true));
        assert_eq!(evaluate("owner = 'x' || 1 = 2", &ctx), Ok(false));
    }

    #[test]
    fn test_and_requires_booleans() {
        let result = evaluate("a && 1", &EvaluationContext::new());
        assert_eq!(result, Err(RuleError::Eval(EvalError::TypeMismatch("&&"))));
    }

    #[test]
    fn test_and_checks_both_sides() {
        assert!(evaluate("false && 1", &EvaluationContext::new()).is_err());
    }

    #[test]
    fn test_or_requires_booleans() {
        assert!(evaluate("'a' || true", &EvaluationContext::new()).is_err());
    }

    // ==================== Relational Operators ====================

    #[test]
    fn test_numeric_comparisons() {
        let ctx = EvaluationContext::new().with_record(map(json!({"age": 21, "score": 7.5})));
        assert_eq!(evaluate("age >= 18", &ctx), Ok(true));
        assert_eq!(evaluate("age < 18", &ctx), Ok(false));
        assert_eq!(evaluate("score > 7", &ctx), Ok(true));
        assert_eq!(evaluate("score <= 7", &ctx), Ok(false));
    }

    #[test]
    fn test_relational_rejects_non_numbers() {
        let ctx = EvaluationContext::new().with_record(map(json!({"age": "21"})));
        assert!(matches!(
            evaluate("age > 18", &ctx),
            Err(RuleError::Eval(EvalError::NotANumber(_)))
        ));
        assert!(evaluate("missing > 1", &ctx).is_err());
    }

    // ==================== Errors ====================

    #[test]
    fn test_non_boolean_result_is_error() {
        assert_eq!(
            evaluate("'hello'", &EvaluationContext::new()),
            Err(RuleError::Eval(EvalError::NotBoolean))
        );
        assert!(evaluate("record.owner", &EvaluationContext::new()).is_err());
    }

    #[test]
    fn test_parse_errors_surface() {
        assert!(matches!(
            evaluate("owner = ", &EvaluationContext::new()),
            Err(RuleError::Parse(_))
        ));
        assert!(matches!(
            evaluate("owner = 'a' garbage", &EvaluationContext::new()),
            Err(RuleError::Parse(_))
        ));
    }

    #[test]
    fn test_null_renders_empty() {
        assert_eq!(RuleValue::Null.to_string(), "");
        assert_eq!(RuleValue::Number(5.0).to_string(), "5");
        assert_eq!(RuleValue::Number(2.5).to_string(), "2.5");
    }
}
