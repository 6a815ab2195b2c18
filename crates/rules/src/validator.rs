//! The rule engine as a [`Validator`].

use std::collections::HashMap;

use conform_core::settings::{IndexSettings, RuleSettings};
use conform_core::{
    CoreError, EntityExtractor, EventReader, Settings, ValidationError, ValidationResult,
    Validator,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::index::RuleIndex;
use crate::loader::{LoadStatus, RuleLoader};

/// Validates events by running the compiled rules of their event type
/// against the extracted entity.
pub struct RuleValidator {
    settings: RuleSettings,
    event_types: Vec<String>,
    reader: EventReader,
    index: Option<RuleIndex>,
}

impl RuleValidator {
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.rules.clone(),
            event_types: settings.dispatch.rule_event_types.clone(),
            reader: EventReader::new(settings.event.clone()),
            index: None,
        }
    }

    /// Build directly from parts, e.g. when the reader is shared.
    pub fn with_parts(
        dirs: Vec<std::path::PathBuf>,
        event_types: Vec<String>,
        indexed: HashMap<String, IndexSettings>,
        reader: EventReader,
    ) -> Self {
        Self {
            settings: RuleSettings { dirs, indexed },
            event_types,
            reader,
            index: None,
        }
    }
}

impl Validator for RuleValidator {
    fn name(&self) -> &str {
        "rules"
    }

    fn initialise(&mut self) -> Result<(), ValidationError> {
        let loader = RuleLoader::new(self.settings.dirs.clone());
        let (sources, results) = loader.load_all()?;

        let skipped = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
            .count();
        for result in &results {
            if let LoadStatus::Skipped { reason } = &result.status {
                debug!(path = %result.path.display(), reason = %reason, "rule file skipped");
            }
        }

        let index = RuleIndex::build(&sources, &self.event_types, &self.settings.indexed)?;
        let stats = index.stats();
        info!(
            files = results.len() - skipped,
            skipped,
            compiled = stats.compiled,
            invalid = stats.invalid,
            "rule engine initialised"
        );
        self.index = Some(index);
        Ok(())
    }

    fn validate(&self, event: &Value, source: &str) -> Result<Vec<ValidationResult>, ValidationError> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| ValidationError::NotInitialised(self.name().to_string()))?;

        let event_type = self.reader.event_type(event).ok_or_else(|| {
            CoreError::MissingPath(self.reader.settings().event_type.to_string())
        })?;

        let entity = self.reader.extract(event)?;
        let rules = index.select(&event_type, &entity)?;

        let mut violations = Vec::new();
        for rule in rules {
            let values = entity.attribute_values(rule.attributes());
            // The first failing execution aborts the whole entity.
            let result = rule.execute(&values)?;
            if !result.success() {
                violations.push(rule.violation(&entity, &values, &result));
            }
        }

        debug!(
            source,
            event_type = %event_type,
            entity = %entity.describe(),
            rules = rules.len(),
            violations = violations.len(),
            "entity validated"
        );
        Ok(vec![ValidationResult::new(&entity, violations)])
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use conform_core::ViolationType;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const COMMON: &str = r#"
rules:
  - name: vserver-name
    category: INVALID_NAME
    severity: MINOR
    attributes: [name]
    errorMessage: "invalid name {0}"
    validate: "name != null && name =~ /^[a-z]/"
  - name: prov-status
    category: INVALID_VALUE
    severity: MAJOR
    attributes: [status]
    errorMessage: "prov-status {0} not allowed"
    validate: "status in ['PROV', 'NVTPROV']"
  - name: port
    category: INVALID_VALUE
    severity: MINOR
    attributes: [port]
    validate: "port.toInteger() > 0"
"#;

    const VSERVER: &str = r#"
entities:
  - type: vserver
    validations:
      - rule: vserver-name
        attributes: [vserver-name]
      - rule: prov-status
        attributes: [prov-status]
"#;

    const PINTERFACE: &str = r#"
entities:
  - type: p-interface
    validations:
      - rule: port
        attributes: [port-number]
"#;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn validator(dir: &TempDir) -> RuleValidator {
        write(dir.path(), "common.yaml", COMMON);
        write(dir.path(), "AAI-EVENT/vserver.yaml", VSERVER);
        write(dir.path(), "AAI-EVENT/p-interface.yaml", PINTERFACE);
        let mut v = RuleValidator::with_parts(
            vec![dir.path().to_path_buf()],
            vec!["AAI-EVENT".to_string()],
            HashMap::new(),
            EventReader::default(),
        );
        v.initialise().unwrap();
        v
    }

    fn event(entity_type: &str, entity: Value) -> Value {
        json!({
            "event-header": {
                "event-type": "AAI-EVENT",
                "entity-type": entity_type,
                "entity-link": format!("/{entity_type}/1")
            },
            "entity": entity
        })
    }

    #[test]
    fn not_initialised_is_an_error() {
        let v = RuleValidator::new(&Settings::default());
        let err = v.validate(&event("vserver", json!({})), "test").unwrap_err();
        assert!(matches!(err, ValidationError::NotInitialised(_)));
    }

    #[test]
    fn clean_entity_has_no_violations() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let results = v
            .validate(
                &event("vserver", json!({"vserver-id": "v1", "vserver-name": "web", "prov-status": "PROV"})),
                "test",
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].violations().is_empty());
        assert_eq!(results[0].entity_type(), "vserver");
    }

    #[test]
    fn failing_rules_produce_rule_violations() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let results = v
            .validate(
                &event("vserver", json!({"vserver-id": "v1", "vserver-name": "Web", "prov-status": "BAD"})),
                "test",
            )
            .unwrap();

        let violations = results[0].violations();
        assert_eq!(violations.len(), 2);

        let name = &violations[0];
        assert_eq!(name.violation_type(), ViolationType::Rule);
        assert_eq!(name.category(), "INVALID_NAME");
        assert_eq!(name.validation_rule(), Some("vserver-name"));
        assert_eq!(name.message(), "invalid name Web");
        assert_eq!(name.violation_details()["vserver-name"], json!("Web"));

        assert_eq!(violations[1].message(), "prov-status BAD not allowed");
        assert_eq!(violations[1].severity(), "MAJOR");
    }

    #[test]
    fn live_execution_error_aborts_the_entity() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let err = v
            .validate(&event("p-interface", json!({"port-number": "eth0"})), "test")
            .unwrap_err();
        assert!(matches!(err, ValidationError::Execution(_)));
    }

    #[test]
    fn unrouted_event_type_is_rules_not_defined() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let mut e = event("vserver", json!({}));
        e["event-header"]["event-type"] = json!("OTHER-EVENT");
        let err = v.validate(&e, "test").unwrap_err();
        assert!(matches!(err, ValidationError::RulesNotDefined { .. }));
    }

    #[test]
    fn missing_event_type_is_an_extraction_error() {
        let dir = TempDir::new().unwrap();
        let v = validator(&dir);
        let err = v.validate(&json!({"entity": {}}), "test").unwrap_err();
        assert!(matches!(err, ValidationError::Extraction(CoreError::MissingPath(_))));
    }
}
