use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::path::AttributePath;

/// Ordered primary-key pairs identifying an entity.
pub type EntityId = IndexMap<String, String>;

/// One object instance extracted from an event.
///
/// Built once per validation call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    entity_type: String,
    keys: EntityId,
    resource_version: Option<String>,
    link: Option<String>,
    payload: Value,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, payload: Value) -> Self {
        Self {
            entity_type: entity_type.into(),
            keys: EntityId::new(),
            resource_version: None,
            link: None,
            payload,
        }
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    pub fn with_resource_version(mut self, resource_version: impl Into<String>) -> Self {
        self.resource_version = Some(resource_version.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn keys(&self) -> &EntityId {
        &self.keys
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Resolve a path against the payload.
    ///
    /// Wildcard paths always succeed with an array (possibly empty). Scalar
    /// paths yield their single value or [`CoreError::MissingPath`].
    pub fn resolve(&self, path: &AttributePath) -> Result<Value, CoreError> {
        let found = path.resolve(&self.payload);
        if path.has_wildcard() {
            return Ok(Value::Array(found.into_iter().cloned().collect()));
        }
        found
            .into_iter()
            .next()
            .cloned()
            .ok_or_else(|| CoreError::MissingPath(path.to_string()))
    }

    /// Resolve a path and render every reached value as text.
    pub fn texts(&self, path: &AttributePath) -> Vec<String> {
        path.texts(&self.payload)
    }

    /// Extract the values of `paths`, keyed by the path text.
    ///
    /// Absent scalar paths map to `null`; absent wildcard paths to `[]`.
    pub fn attribute_values(&self, paths: &[AttributePath]) -> AttributeValues {
        paths
            .iter()
            .map(|p| (p.to_string(), self.resolve(p).unwrap_or(Value::Null)))
            .collect()
    }

    /// Human-readable identity, e.g. `vserver[vserver-id=v1]`.
    pub fn describe(&self) -> String {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}[{}]", self.entity_type, keys.join(","))
    }
}

/// Attribute name → extracted value(s) for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeValues {
    values: HashMap<String, Value>,
}

impl AttributeValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for AttributeValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
