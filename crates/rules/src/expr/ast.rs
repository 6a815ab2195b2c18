use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    /// Positional parameter, resolved from a variable name at compile time.
    Param(usize),
    List(Vec<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// `=~` (find) or `==~` (whole-string match).
    Match {
        subject: Box<Expr>,
        pattern: Pattern,
        full: bool,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `value ?: fallback`
    Elvis {
        value: Box<Expr>,
        fallback: Box<Expr>,
    },
    Property {
        object: Box<Expr>,
        name: String,
        null_safe: bool,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        null_safe: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    In,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::In => "in",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Right-hand side of a regex operator.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// A literal pattern, compiled together with the expression.
    Static(Regex),
    /// Any other expression; compiled on every evaluation.
    Dynamic(Box<Expr>),
}

impl Expr {
    /// Elements of a top-level list literal, if this is one.
    pub fn as_list_literal(&self) -> Option<&[Expr]> {
        match self {
            Expr::List(items) => Some(items),
            _ => None,
        }
    }
}
