use thiserror::Error;

/// Errors raised while reading events and resolving entity attributes.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid attribute path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A required path resolved to nothing. Callers match on this variant to
    /// tell absent data apart from malformed data.
    #[error("required path '{0}' not found")]
    MissingPath(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Errors surfaced by a [`Validator`](crate::Validator).
///
/// Each engine crate converts its own error type into this one so the
/// dispatcher can treat both engines uniformly.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("validator '{0}' used before initialise()")]
    NotInitialised(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("rules not defined for event type '{event_type}' and key '{key}'")]
    RulesNotDefined { event_type: String, key: String },

    #[error("execution error: {0}")]
    Execution(String),

    #[error("entity extraction failed: {0}")]
    Extraction(#[from] CoreError),

    #[error("model error: {0}")]
    Model(String),
}
