//! Engine settings loaded from a TOML file.
//!
//! ```toml
//! [dispatch]
//! domain = "dev"
//! excluded_actions = ["DELETE"]
//! rule_event_types = ["AAI-EVENT"]
//! model_event_types = ["AAI-DATA-EXPORT"]
//!
//! [rules]
//! dirs = ["config/rules"]
//!
//! [rules.indexed.POA-EVENT]
//! attributes = ["type"]
//! default_key = "[default]"
//!
//! [model]
//! mapping_file = "config/model-mapping.yaml"
//!
//! [model.provider]
//! kind = "file"
//! dir = "config/models"
//! ```
//!
//! Environment variables override a few deployment-specific keys; see
//! [`Settings::apply_env_overrides`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::AttributePath;

/// Errors raised while loading or checking settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ── Top-level settings ──────────────────────────────────────────────

/// Full engine configuration: dispatcher routing, event layout, rule
/// sources, and the model engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub event: EventSettings,

    #[serde(default)]
    pub rules: RuleSettings,

    #[serde(default)]
    pub model: ModelSettings,
}

// ── Section settings ────────────────────────────────────────────────

/// How the dispatcher filters and routes events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Events declaring a different domain are filtered. `None` accepts all.
    #[serde(default)]
    pub domain: Option<String>,

    /// Actions (e.g. `DELETE`) that are never validated.
    #[serde(default)]
    pub excluded_actions: Vec<String>,

    /// Event type marking end-of-stream.
    #[serde(default = "default_end_event_type")]
    pub end_event_type: Option<String>,

    /// Event types routed to the rule engine.
    #[serde(default)]
    pub rule_event_types: Vec<String>,

    /// Event types routed to the model engine.
    #[serde(default)]
    pub model_event_types: Vec<String>,

    /// Sources counted on their own. Any other source is counted as `other`.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
}

fn default_end_event_type() -> Option<String> {
    Some("END-EVENT".to_string())
}

fn default_sources() -> Vec<String> {
    ["http", "cli", "bus"].map(String::from).to_vec()
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            domain: None,
            excluded_actions: Vec::new(),
            end_event_type: default_end_event_type(),
            rule_event_types: Vec::new(),
            model_event_types: Vec::new(),
            sources: default_sources(),
        }
    }
}

/// Where the interesting fields live inside a raw event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_event_type_path")]
    pub event_type: AttributePath,

    #[serde(default = "default_domain_path")]
    pub domain: AttributePath,

    #[serde(default = "default_action_path")]
    pub action: AttributePath,

    #[serde(default = "default_entity_type_path")]
    pub entity_type: AttributePath,

    #[serde(default = "default_entity_link_path")]
    pub entity_link: AttributePath,

    /// Path to the entity payload object.
    #[serde(default = "default_entity_path")]
    pub entity: AttributePath,

    /// Payload attribute holding the resource version.
    #[serde(default = "default_resource_version")]
    pub resource_version: String,

    /// Entity type → ordered primary-key attribute names.
    #[serde(default)]
    pub keys: HashMap<String, Vec<String>>,
}

fn default_event_type_path() -> AttributePath {
    AttributePath::from_fields(&["event-header", "event-type"])
}

fn default_domain_path() -> AttributePath {
    AttributePath::from_fields(&["event-header", "domain"])
}

fn default_action_path() -> AttributePath {
    AttributePath::from_fields(&["event-header", "action"])
}

fn default_entity_type_path() -> AttributePath {
    AttributePath::from_fields(&["event-header", "entity-type"])
}

fn default_entity_link_path() -> AttributePath {
    AttributePath::from_fields(&["event-header", "entity-link"])
}

fn default_entity_path() -> AttributePath {
    AttributePath::from_fields(&["entity"])
}

fn default_resource_version() -> String {
    "resource-version".to_string()
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            event_type: default_event_type_path(),
            domain: default_domain_path(),
            action: default_action_path(),
            entity_type: default_entity_type_path(),
            entity_link: default_entity_link_path(),
            entity: default_entity_path(),
            resource_version: default_resource_version(),
            keys: HashMap::new(),
        }
    }
}

/// Rule sources and per-event-type indexing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSettings {
    /// Directories scanned for rule files. Immediate subfolders name event types.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,

    /// Event types whose rules are selected by a composite value key.
    #[serde(default)]
    pub indexed: HashMap<String, IndexSettings>,
}

/// Secondary rule lookup for one high-volume event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Entity attributes whose values form the lookup key.
    pub attributes: Vec<AttributePath>,

    /// Key used when nothing is registered under the computed one.
    #[serde(default)]
    pub default_key: Option<String>,
}

/// Model engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// YAML file listing the model/instance mappings.
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,

    /// Instance attribute holding the reference model id.
    #[serde(default = "default_model_id_path")]
    pub model_id_path: AttributePath,

    /// Instance attribute holding the owning model name.
    #[serde(default)]
    pub model_name_path: Option<AttributePath>,

    #[serde(default = "default_model_category")]
    pub category: String,

    #[serde(default = "default_model_severity")]
    pub severity: String,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Most models (including negative lookups) kept at once.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Bound on comparator recursion and sub-model descent.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default)]
    pub provider: ProviderSettings,
}

fn default_model_id_path() -> AttributePath {
    AttributePath::from_fields(&["model-version-id"])
}

fn default_model_category() -> String {
    "INVALID_OBJ".to_string()
}

fn default_model_severity() -> String {
    "CRITICAL".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_max_depth() -> usize {
    32
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            mapping_file: None,
            model_id_path: default_model_id_path(),
            model_name_path: None,
            category: default_model_category(),
            severity: default_model_severity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            max_depth: default_max_depth(),
            provider: ProviderSettings::default(),
        }
    }
}

impl ModelSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Reference model provider kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    File,
    Http,
}

/// Reference model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Directory of `<model-id>.json` files (`kind = "file"`).
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Base URL; models are fetched from `<url>/<model-id>` (`kind = "http"`).
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::File,
            dir: None,
            url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Loading ─────────────────────────────────────────────────────────

impl Settings {
    /// Parse settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = toml::from_str(toml_str)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Apply environment variable overrides.
    ///
    /// - `CONFORM_DISPATCH_DOMAIN` -> `dispatch.domain`
    /// - `CONFORM_MODEL_CACHE_TTL_SECS` -> `model.cache_ttl_secs`
    /// - `CONFORM_MODEL_PROVIDER_URL` -> `model.provider.url`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CONFORM_DISPATCH_DOMAIN") {
            self.dispatch.domain = Some(v).filter(|d| !d.is_empty());
        }
        if let Ok(v) = std::env::var("CONFORM_MODEL_CACHE_TTL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.model.cache_ttl_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("CONFORM_MODEL_PROVIDER_URL") {
            self.model.provider.url = Some(v);
        }
    }

    /// Check cross-section consistency.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let rule_types: HashSet<&str> = self
            .dispatch
            .rule_event_types
            .iter()
            .map(String::as_str)
            .collect();

        if let Some(both) = self
            .dispatch
            .model_event_types
            .iter()
            .find(|t| rule_types.contains(t.as_str()))
        {
            return Err(SettingsError::Invalid(format!(
                "event type '{both}' is routed to both the rule and the model engine"
            )));
        }

        if let Some(end) = &self.dispatch.end_event_type {
            let routed = rule_types.contains(end.as_str())
                || self.dispatch.model_event_types.contains(end);
            if routed {
                return Err(SettingsError::Invalid(format!(
                    "end-of-stream event type '{end}' must not be routed to an engine"
                )));
            }
        }

        for (event_type, index) in &self.rules.indexed {
            if !rule_types.contains(event_type.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "indexed event type '{event_type}' is not a rule event type"
                )));
            }
            if index.attributes.is_empty() {
                return Err(SettingsError::Invalid(format!(
                    "indexed event type '{event_type}' needs at least one index attribute"
                )));
            }
        }

        if self.model.cache_capacity == 0 {
            return Err(SettingsError::Invalid(
                "model.cache_capacity must be at least 1".to_string(),
            ));
        }

        if !self.dispatch.model_event_types.is_empty() {
            if self.model.mapping_file.is_none() {
                return Err(SettingsError::Invalid(
                    "model event types are configured but model.mapping_file is not".to_string(),
                ));
            }
            match self.model.provider.kind {
                ProviderKind::File if self.model.provider.dir.is_none() => {
                    return Err(SettingsError::Invalid(
                        "model.provider.kind = \"file\" requires model.provider.dir".to_string(),
                    ));
                }
                ProviderKind::Http if self.model.provider.url.is_none() => {
                    return Err(SettingsError::Invalid(
                        "model.provider.kind = \"http\" requires model.provider.url".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
