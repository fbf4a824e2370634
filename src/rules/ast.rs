use std::fmt;

/// Binary operator of an infix expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    And,
    Or,
}

impl InfixOp {
    pub fn as_str(self) -> &'static str {
        match self {
            InfixOp::Eq => "=",
            InfixOp::NotEq => "!=",
            InfixOp::Gt => ">",
            InfixOp::Lt => "<",
            InfixOp::Gte => ">=",
            InfixOp::Lte => "<=",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
        }
    }
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(String),
    StringLiteral(String),
    IntegerLiteral(i64),
    BooleanLiteral(bool),
    Infix {
        left: Box<Expr>,
        op: InfixOp,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn infix(left: Expr, op: InfixOp, right: Expr) -> Self {
        Expr::Infix {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }
}

/// Fully parenthesized rendering, handy for checking precedence
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier(name) => f.write_str(name),
            Expr::StringLiteral(s) => write!(f, "'{}'", s),
            Expr::IntegerLiteral(n) => write!(f, "{}", n),
            Expr::BooleanLiteral(b) => write!(f, "{}", b),
            Expr::Infix { left, op, right } => write!(f, "({} {} {})", left, op, right),
        }
    }
}
