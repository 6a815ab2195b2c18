//! Reference model providers.
//!
//! A provider looks a model up by id and returns `Ok(None)` when no such
//! model exists. Errors are reserved for failures to ask (I/O, transport,
//! malformed JSON).

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use conform_core::settings::{ProviderKind, ProviderSettings};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ModelError, Result};
use crate::node::ModelNode;

/// Source of reference models.
pub trait ModelProvider: Send + Sync {
    fn fetch(&self, model_id: &str) -> Result<Option<ModelNode>>;
}

/// Build the provider described by `[model.provider]`.
pub fn provider_from_settings(settings: &ProviderSettings) -> Result<Box<dyn ModelProvider>> {
    match settings.kind {
        ProviderKind::File => {
            let dir = settings.dir.clone().ok_or_else(|| {
                ModelError::Config("file model provider needs a directory".to_string())
            })?;
            Ok(Box::new(FileModelProvider::new(dir)))
        }
        ProviderKind::Http => {
            let url = settings.url.as_deref().ok_or_else(|| {
                ModelError::Config("http model provider needs a base URL".to_string())
            })?;
            Ok(Box::new(HttpModelProvider::new(url, settings.timeout())?))
        }
    }
}

fn is_plain_id(model_id: &str) -> bool {
    !model_id.is_empty()
        && !model_id.starts_with('.')
        && !model_id.contains(['/', '\\'])
}

// ── File provider ───────────────────────────────────────────────────

/// Reads `<dir>/<model-id>.json`.
#[derive(Debug, Clone)]
pub struct FileModelProvider {
    dir: PathBuf,
}

impl FileModelProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ModelProvider for FileModelProvider {
    fn fetch(&self, model_id: &str) -> Result<Option<ModelNode>> {
        if !is_plain_id(model_id) {
            warn!(model_id, "model id is not a plain file name, treated as unknown");
            return Ok(None);
        }

        let path = self.dir.join(format!("{model_id}.json"));
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(model_id, path = %path.display(), "model file not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let value: Value = serde_json::from_str(&content)?;
        Ok(Some(ModelNode::new(value)))
    }
}

// ── HTTP provider ───────────────────────────────────────────────────

/// Fetches `GET <base_url>/<model-id>`; a 404 means no such model.
///
/// Uses the blocking client, so callers on an async runtime must run it on
/// the blocking pool.
#[derive(Debug, Clone)]
pub struct HttpModelProvider {
    base_url: Url,
    client: Client,
}

impl HttpModelProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ModelError::Config(format!("invalid model provider URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ModelError::Config(format!(
                "model provider URL '{base_url}' cannot be a base"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    fn model_url(&self, model_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(model_id);
        }
        url
    }
}

impl ModelProvider for HttpModelProvider {
    fn fetch(&self, model_id: &str) -> Result<Option<ModelNode>> {
        let url = self.model_url(model_id);
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(model_id, url = %url, "model not found");
            return Ok(None);
        }
        if !status.is_success() {
            warn!(model_id, url = %url, %status, "model provider returned non-2xx status");
            return Err(ModelError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let value: Value = response.json()?;
        Ok(Some(ModelNode::new(value)))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
