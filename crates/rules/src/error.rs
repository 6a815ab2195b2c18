//! Error types for rule loading, compilation and execution.

use std::path::PathBuf;

use conform_core::{CoreError, ValidationError};

use crate::expr::{EvalError, ExprError};

/// Errors that can occur while loading, compiling or running rules.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory walk error.
    #[error("rule directory error: {0}")]
    Walk(#[from] walkdir::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Rule expression does not compile.
    #[error("rule '{rule}' does not compile: {source}")]
    Compile { rule: String, source: ExprError },

    /// Inconsistent rule configuration (unknown rule reference, arity mismatch, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// A live rule evaluation failed.
    #[error("rule '{rule}' failed: {source}")]
    Execution { rule: String, source: EvalError },

    /// Rule was marked invalid at load time and cannot run.
    #[error("rule '{0}' is invalid")]
    InvalidRule(String),

    /// No rules are registered for the event type and lookup key.
    #[error("rules not defined for event type '{event_type}' and key '{key}'")]
    RulesNotDefined { event_type: String, key: String },

    #[error("entity extraction failed: {0}")]
    Extraction(#[from] CoreError),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

impl From<RuleError> for ValidationError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::RulesNotDefined { event_type, key } => {
                ValidationError::RulesNotDefined { event_type, key }
            }
            RuleError::Execution { .. } | RuleError::InvalidRule(_) => {
                ValidationError::Execution(err.to_string())
            }
            RuleError::Extraction(e) => ValidationError::Extraction(e),
            other => ValidationError::Config(other.to_string()),
        }
    }
}
