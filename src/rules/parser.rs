//! Pratt parser for rule expressions

use thiserror::Error;

use super::ast::{Expr, InfixOp};
use super::lexer::{Lexer, Token};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected {0}")]
    UnexpectedToken(String),

    #[error("expected closing parenthesis, found {0}")]
    MissingClosingParen(String),

    #[error("could not parse {0:?} as integer")]
    InvalidInteger(String),

    #[error("{0}")]
    Illegal(String),

    #[error("unexpected trailing {0}")]
    TrailingInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equals,
    LessGreater,
}

fn infix_of(token: &Token) -> Option<(InfixOp, Precedence)> {
    let pair = match token {
        Token::Or => (InfixOp::Or, Precedence::Or),
        Token::And => (InfixOp::And, Precedence::And),
        Token::Eq => (InfixOp::Eq, Precedence::Equals),
        Token::NotEq => (InfixOp::NotEq, Precedence::Equals),
        Token::Gt => (InfixOp::Gt, Precedence::LessGreater),
        Token::Lt => (InfixOp::Lt, Precedence::LessGreater),
        Token::Gte => (InfixOp::Gte, Precedence::LessGreater),
        Token::Lte => (InfixOp::Lte, Precedence::LessGreater),
        _ => return None,
    };
    Some(pair)
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    peek: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let cur = lexer.next_token();
        let peek = lexer.next_token();
        Self { lexer, cur, peek }
    }

    fn advance(&mut self) {
        self.cur = std::mem::replace(&mut self.peek, self.lexer.next_token());
    }

    fn peek_precedence(&self) -> Precedence {
        infix_of(&self.peek).map_or(Precedence::Lowest, |(_, p)| p)
    }

    /// Parse the whole input as a single expression
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        match &self.peek {
            Token::Eof => Ok(expr),
            Token::Illegal(s) => Err(ParseError::Illegal(format!("illegal input '{}'", s))),
            other => Err(ParseError::TrailingInput(other.to_string())),
        }
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;

        while self.peek != Token::Eof && precedence < self.peek_precedence() {
            self.advance();
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match &self.cur {
            Token::Ident(name) => Ok(Expr::Identifier(name.clone())),
            Token::Str(s) => Ok(Expr::StringLiteral(s.clone())),
            Token::Int(digits) => digits
                .parse::<i64>()
                .map(Expr::IntegerLiteral)
                .map_err(|_| ParseError::InvalidInteger(digits.clone())),
            Token::Bool(b) => Ok(Expr::BooleanLiteral(*b)),
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression(Precedence::Lowest)?;
                if self.peek != Token::RParen {
                    return Err(ParseError::MissingClosingParen(self.peek.to_string()));
                }
                self.advance();
                Ok(inner)
            }
            Token::Illegal(s) => Err(ParseError::Illegal(format!("illegal input '{}'", s))),
            other => Err(ParseError::UnexpectedToken(other.to_string())),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, ParseError> {
        let (op, precedence) = infix_of(&self.cur)
            .ok_or_else(|| ParseError::UnexpectedToken(self.cur.to_string()))?;
        self.advance();
        let right = self.parse_expression(precedence)?;
        Ok(Expr::infix(left, op, right))
    }
}

/// Parse a rule expression into its AST
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    Parser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(input: &str) -> String {
        parse(input).expect("should parse").to_string()
    }

    #[test]
    fn test_parse_simple_comparison() {
        assert_eq!(
            parse("@request.auth.id = record.owner").unwrap(),
            Expr::infix(
                Expr::Identifier("@request.auth.id".into()),
                InfixOp::Eq,
                Expr::Identifier("record.owner".into()),
            )
        );
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(render("a = 1 || b = 2 && c = 3"), "((a = 1) || ((b = 2) && (c = 3)))");
        assert_eq!(render("a > 1 = true"), "((a > 1) = true)");
        assert_eq!(render("a = b = c"), "((a = b) = c)");
    }

    #[test]
    fn test_parse_parentheses_override_precedence() {
        assert_eq!(render("(a = 1 || b = 2) && c = 3"), "(((a = 1) || (b = 2)) && (c = 3))");
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("'x'").unwrap(), Expr::StringLiteral("x".into()));
        assert_eq!(parse("42").unwrap(), Expr::IntegerLiteral(42));
        assert_eq!(parse("true").unwrap(), Expr::BooleanLiteral(true));
    }

    #[test]
    fn test_parse_missing_paren() {
        assert!(matches!(
            parse("(a = 1"),
            Err(ParseError::MissingClosingParen(_))
        ));
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(matches!(parse(""), Err(ParseError::UnexpectedToken(_))));
    }

    #[test]
    fn test_parse_dangling_operator() {
        assert!(matches!(parse("a ="), Err(ParseError::UnexpectedToken(_))));
        assert!(matches!(parse("&& a"), Err(ParseError::UnexpectedToken(_))));
    }

    #[test]
    fn test_parse_trailing_tokens_rejected() {
        assert!(matches!(parse("a = 1 b"), Err(ParseError::TrailingInput(_))));
        assert!(matches!(parse("a = 1)"), Err(ParseError::TrailingInput(_))));
    }

    #[test]
    fn test_parse_illegal_tokens_rejected() {
        assert!(matches!(parse("a = 1 & b = 2"), Err(ParseError::Illegal(_))));
        assert!(matches!(parse("a = 'open"), Err(ParseError::Illegal(_))));
        assert!(matches!(parse("#"), Err(ParseError::Illegal(_))));
    }

    #[test]
    fn test_parse_integer_overflow() {
        assert!(matches!(
            parse("a > 99999999999999999999"),
            Err(ParseError::InvalidInteger(_))
        ));
    }
}
