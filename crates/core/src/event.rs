//! Raw event parsing, header fields, and entity extraction.

use serde_json::Value;

use crate::entity::Entity;
use crate::error::CoreError;
use crate::path::{scalar_text, AttributePath};
use crate::settings::EventSettings;

/// Builds an [`Entity`] out of a parsed event.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, event: &Value) -> Result<Entity, CoreError>;
}

/// Parse a raw event body. Only JSON objects are accepted.
pub fn parse_event(raw: &str) -> Result<Value, CoreError> {
    let json: Value = serde_json::from_str(raw)?;
    if !json.is_object() {
        return Err(CoreError::InvalidEvent(
            "event body is not a JSON object".to_string(),
        ));
    }
    Ok(json)
}

/// Reads header fields and the entity payload from events laid out as
/// described by [`EventSettings`].
#[derive(Debug, Clone, Default)]
pub struct EventReader {
    settings: EventSettings,
}

impl EventReader {
    pub fn new(settings: EventSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EventSettings {
        &self.settings
    }

    pub fn event_type(&self, event: &Value) -> Option<String> {
        header_text(event, &self.settings.event_type)
    }

    pub fn domain(&self, event: &Value) -> Option<String> {
        header_text(event, &self.settings.domain)
    }

    pub fn action(&self, event: &Value) -> Option<String> {
        header_text(event, &self.settings.action)
    }

    pub fn entity_type(&self, event: &Value) -> Option<String> {
        header_text(event, &self.settings.entity_type)
    }

    pub fn entity_link(&self, event: &Value) -> Option<String> {
        header_text(event, &self.settings.entity_link)
    }

    fn key_attributes(&self, entity_type: &str) -> Option<&[String]> {
        self.settings.keys.get(entity_type).map(Vec::as_slice)
    }
}

fn header_text(event: &Value, path: &AttributePath) -> Option<String> {
    path.first(event)
        .map(scalar_text)
        .filter(|s| !s.is_empty())
}

impl EntityExtractor for EventReader {
    /// Extract the entity payload with its type, keys, resource version and link.
    ///
    /// Configured key attributes are required. Without configuration the
    /// conventional `<entity-type>-id` attribute is used when present.
    fn extract(&self, event: &Value) -> Result<Entity, CoreError> {
        let entity_type = self
            .entity_type(event)
            .ok_or_else(|| CoreError::MissingPath(self.settings.entity_type.to_string()))?;

        let payload = self
            .settings
            .entity
            .first(event)
            .ok_or_else(|| CoreError::MissingPath(self.settings.entity.to_string()))?;

        let Some(object) = payload.as_object() else {
            return Err(CoreError::InvalidEvent(format!(
                "entity at '{}' is not a JSON object",
                self.settings.entity
            )));
        };

        let mut entity = Entity::new(entity_type.clone(), payload.clone());

        match self.key_attributes(&entity_type) {
            Some(names) => {
                for name in names {
                    let value = object
                        .get(name)
                        .filter(|v| !v.is_null())
                        .ok_or_else(|| CoreError::MissingPath(format!("{entity_type}.{name}")))?;
                    entity = entity.with_key(name.clone(), scalar_text(value));
                }
            }
            None => {
                let conventional = format!("{entity_type}-id");
                if let Some(value) = object.get(&conventional).filter(|v| !v.is_null()) {
                    entity = entity.with_key(conventional, scalar_text(value));
                }
            }
        }

        if let Some(rv) = object
            .get(&self.settings.resource_version)
            .filter(|v| !v.is_null())
        {
            entity = entity.with_resource_version(scalar_text(rv));
        }

        if let Some(link) = self.entity_link(event) {
            entity = entity.with_link(link);
        }

        Ok(entity)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
