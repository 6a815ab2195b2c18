//! Error types for the model engine.

use std::path::PathBuf;

use conform_core::{CoreError, ValidationError};

/// Errors raised while loading mappings, fetching models or comparing.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model provider returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("YAML parse error in {}: {source}", path.display())]
    Mapping {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Mapping configuration is unusable for the data it is applied to.
    #[error("model configuration error: {0}")]
    Config(String),

    #[error("entity extraction failed: {0}")]
    Extraction(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl From<ModelError> for ValidationError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Extraction(e) => ValidationError::Extraction(e),
            ModelError::Config(msg) => ValidationError::Config(msg),
            ModelError::Mapping { .. } => ValidationError::Config(err.to_string()),
            other => ValidationError::Model(other.to_string()),
        }
    }
}
