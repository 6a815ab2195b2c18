//! The model engine as a [`Validator`].

use std::num::NonZeroUsize;

use conform_core::path::scalar_text;
use conform_core::settings::ModelSettings;
use conform_core::{
    Entity, EntityExtractor, EventReader, Settings, ValidationError, ValidationResult, Validator,
    Violation, ViolationBuilder, ViolationType,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::ModelCache;
use crate::compare::Comparator;
use crate::error::ModelError;
use crate::mapping::MappingSet;
use crate::provider::{provider_from_settings, ModelProvider};

/// Validates events by comparing the entity against its reference model.
pub struct ModelValidator {
    settings: ModelSettings,
    reader: EventReader,
    provider: Option<Box<dyn ModelProvider>>,
    mappings: Option<MappingSet>,
    cache: Option<ModelCache>,
}

impl ModelValidator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.model.clone(),
            reader: EventReader::new(settings.event.clone()),
            provider: None,
            mappings: None,
            cache: None,
        }
    }

    /// Use `provider` instead of the one described by the settings.
    pub fn with_provider(mut self, provider: Box<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use `mappings` when no mapping file is configured.
    pub fn with_mappings(mut self, mappings: MappingSet) -> Self {
        self.mappings = Some(mappings);
        self
    }

    fn no_model(&self, entity: &Entity, model_id: Option<&str>) -> Violation {
        let message = match model_id {
            Some(id) => format!("no reference model found for id '{id}'"),
            None => format!(
                "entity has no model id at '{}'",
                self.settings.model_id_path
            ),
        };
        ViolationBuilder::for_entity(entity)
            .category(&self.settings.category)
            .severity(&self.settings.severity)
            .violation_type(ViolationType::NoModel)
            .message(message)
            .detail("modelId", model_id.map_or(Value::Null, Value::from))
            .build()
    }
}

impl Validator for ModelValidator {
    fn name(&self) -> &str {
        "model"
    }

    fn initialise(&mut self) -> Result<(), ValidationError> {
        let mappings = match (&self.settings.mapping_file, self.mappings.take()) {
            (Some(path), _) => MappingSet::load(path)?,
            (None, Some(mappings)) => {
                mappings.validate()?;
                mappings
            }
            (None, None) => {
                return Err(ModelError::Config("no model mapping configured".to_string()).into());
            }
        };

        let provider = match self.provider.take() {
            Some(provider) => provider,
            None => provider_from_settings(&self.settings.provider)?,
        };

        let capacity = NonZeroUsize::new(self.settings.cache_capacity)
            .ok_or_else(|| ModelError::Config("model cache capacity must be at least 1".to_string()))?;

        info!(
            mappings = mappings.mappings.len(),
            cache_ttl_secs = self.settings.cache_ttl_secs,
            cache_capacity = capacity.get(),
            max_depth = self.settings.max_depth,
            "model engine initialised"
        );
        self.cache = Some(ModelCache::new(provider, self.settings.cache_ttl(), capacity));
        self.mappings = Some(mappings);
        Ok(())
    }

    fn validate(&self, event: &Value, source: &str) -> Result<Vec<ValidationResult>, ValidationError> {
        let (Some(mappings), Some(cache)) = (&self.mappings, &self.cache) else {
            return Err(ValidationError::NotInitialised(self.name().to_string()));
        };

        let entity = self.reader.extract(event)?;
        let payload = entity.payload();

        let model_name = self
            .settings
            .model_name_path
            .as_ref()
            .and_then(|p| p.first(payload))
            .map(scalar_text);

        let model_id = self
            .settings
            .model_id_path
            .first(payload)
            .map(scalar_text)
            .filter(|id| !id.is_empty());

        let violations = match model_id {
            None => vec![self.no_model(&entity, None)],
            Some(id) => match cache.get(&id)? {
                None => vec![self.no_model(&entity, Some(&id))],
                Some(model) => {
                    let mut out = Vec::new();
                    Comparator::new(mappings, cache, &self.settings).compare(model.value(), &entity, &mut out)?;
                    out
                }
            },
        };

        debug!(
            source,
            entity = %entity.describe(),
            model_name = model_name.as_deref().unwrap_or(""),
            violations = violations.len(),
            "entity compared"
        );
        Ok(vec![ValidationResult::with_model_name(
            &entity,
            violations,
            model_name.as_deref(),
        )])
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ModelNode;
    use conform_core::AttributePath;
    use serde_json::json;

    struct Fixed(Value);

    impl ModelProvider for Fixed {
        fn fetch(&self, model_id: &str) -> crate::error::Result<Option<ModelNode>> {
            Ok((model_id == "m1").then(|| ModelNode::new(self.0.clone())))
        }
    }

    const MAPPINGS: &str = r#"
mappings:
  - name: children
    kind: relationship
    model: { root: "children[*]", model-name: name }
    instance: { root: "relationship-list.relationship[*]", entity-type: related-to }
"#;

    fn validator() -> ModelValidator {
        let mut settings = Settings::default();
        settings.model.model_name_path = Some(AttributePath::parse("model-name").unwrap());
        let model = json!({"children": [{"name": "pserver"}, {"name": "image"}]});
        let mut v = ModelValidator::new(&settings)
            .with_provider(Box::new(Fixed(model)))
            .with_mappings(MappingSet::from_yaml(MAPPINGS).unwrap());
        v.initialise().unwrap();
        v
    }

    fn event(entity: Value) -> Value {
        json!({
            "event-header": {"event-type": "AAI-DATA-EXPORT", "entity-type": "vserver"},
            "entity": entity
        })
    }

    #[test]
    fn missing_model_id_is_no_model() {
        let results = validator().validate(&event(json!({"vserver-id": "v1"})), "test").unwrap();
        let violations = results[0].violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type(), ViolationType::NoModel);
    }

    #[test]
    fn unknown_model_is_no_model() {
        let results = validator()
            .validate(&event(json!({"vserver-id": "v1", "model-version-id": "nope"})), "test")
            .unwrap();
        let violation = &results[0].violations()[0];
        assert_eq!(violation.violation_type(), ViolationType::NoModel);
        assert_eq!(violation.violation_details()["modelId"], json!("nope"));
    }

    #[test]
    fn violations_carry_the_owning_model_name() {
        let entity = json!({
            "vserver-id": "v1",
            "model-version-id": "m1",
            "model-name": "vFW",
            "relationship-list": {"relationship": [{"related-to": "pserver"}]}
        });
        let results = validator().validate(&event(entity), "test").unwrap();
        let violations = results[0].violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type(), ViolationType::MissingRel);
        assert_eq!(violations[0].model_name(), Some("vFW"));
    }

    #[test]
    fn not_initialised_is_an_error() {
        let v = ModelValidator::new(&Settings::default());
        assert!(matches!(
            v.validate(&event(json!({})), "test"),
            Err(ValidationError::NotInitialised(_))
        ));
    }

    #[test]
    fn initialise_requires_a_mapping() {
        let mut v = ModelValidator::new(&Settings::default()).with_provider(Box::new(Fixed(json!({}))));
        assert!(matches!(v.initialise(), Err(ValidationError::Config(_))));
    }
}
