use thiserror::Error;

/// Errors raised while compiling an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{found}' at offset {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// Errors raised while evaluating a compiled expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("no method '{method}' with {arity} argument(s) on {receiver}")]
    NoSuchMethod {
        method: String,
        receiver: &'static str,
        arity: usize,
    },

    #[error("no property '{property}' on {receiver}")]
    NoSuchProperty {
        property: String,
        receiver: &'static str,
    },

    #[error("null reference: {0}")]
    NullReference(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("conversion error: {0}")]
    Conversion(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("expected {expected} argument(s), got {actual}")]
    Arity { expected: usize, actual: usize },
}

impl EvalError {
    /// Whether the failure is a method or property the receiver does not
    /// have, as opposed to a genuine evaluation failure.
    pub fn is_missing_member(&self) -> bool {
        matches!(
            self,
            EvalError::NoSuchMethod { .. } | EvalError::NoSuchProperty { .. }
        )
    }

    /// Whether the failure can come from running a rule on string
    /// placeholders: a missing member, or arithmetic other than `+` on a
    /// value that is not a number.
    pub fn is_placeholder_artifact(&self) -> bool {
        match self {
            EvalError::TypeMismatch { op, .. } => {
                matches!(*op, "-" | "*" | "/" | "%" | "unary -")
            }
            other => other.is_missing_member(),
        }
    }
}
