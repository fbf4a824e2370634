//! Rule expression language
//!
//! Collections carry one rule per operation, e.g.
//! `@request.auth.id != '' && record.owner = @request.auth.id`.
//! Rules are lexed, parsed with a Pratt parser and evaluated against an
//! [`EvaluationContext`]. Parse or evaluation failures always mean deny.

pub mod ast;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, InfixOp};
pub use evaluator::{EvalError, EvaluationContext, RuleError, RuleValue, evaluate};
pub use lexer::{Lexer, Token};
pub use parser::{ParseError, Parser, parse};

use crate::error::{Result, VaultError};
use crate::schema::{Collection, RuleAction};

impl From<RuleError> for VaultError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Parse(e) => VaultError::RuleParse(e),
            RuleError::Eval(e) => VaultError::RuleEval(e),
        }
    }
}

/// Check `collection`'s rule for `action` against `ctx`
///
/// Returns `Forbidden` when the rule evaluates to false or fails to parse or
/// evaluate.
pub fn authorize(
    collection: &Collection,
    action: RuleAction,
    ctx: &EvaluationContext,
) -> Result<()> {
    let rule = collection.rule(action).unwrap_or("");

    match evaluate(rule, ctx) {
        Ok(true) => Ok(()),
        Ok(false) => Err(VaultError::forbidden(format!(
            "{} rule denied access to '{}'",
            action, collection.name
        ))),
        Err(err) => {
            tracing::debug!(
                collection = %collection.name,
                action = %action,
                error = %err,
                "rule failed, denying"
            );
            Err(VaultError::forbidden(format!(
                "{} rule on '{}' could not be evaluated: {}",
                action, collection.name, err
            )))
        }
    }
}
