//! YAML rule file structures.
//!
//! ```yaml
//! rules:
//!   - name: vserver-name-present
//!     category: MISSING_ATTR
//!     description: vserver must have a name
//!     severity: CRITICAL
//!     attributes: [name]
//!     errorMessage: "vserver name is {0}"
//!     validate: 'name != null && name.size() > 0'
//! entities:
//!   - type: vserver
//!     validations:
//!       - rule: vserver-name-present
//!         attributes: [vserver-name]
//! ```
//!
//! A rule's `attributes` are the variable names its `validate` expression
//! uses. An entity's validation entry maps those names, by position, to
//! attribute paths in the entity payload; without an override the rule's own
//! names are used as paths.

use serde::{Deserialize, Serialize};

/// One rule YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    #[serde(default)]
    pub entities: Vec<EntitySection>,
}

/// A named, reusable rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    pub name: String,

    pub category: String,

    #[serde(default)]
    pub description: String,

    pub severity: String,

    #[serde(default)]
    pub attributes: Vec<String>,

    /// Message template with positional `{0}`, `{1}` placeholders. Defaults
    /// to the description.
    #[serde(default)]
    pub error_message: Option<String>,

    /// The predicate expression.
    pub validate: String,
}

impl RuleConfig {
    pub fn message_template(&self) -> &str {
        self.error_message.as_deref().unwrap_or(&self.description)
    }
}

/// Rules applied to one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySection {
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Index keys this section registers under (indexed event types only).
    #[serde(default)]
    pub indexing: Option<Indexing>,

    #[serde(default)]
    pub validations: Vec<ValidationRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indexing {
    #[serde(default)]
    pub indices: Vec<String>,
}

/// Reference to a rule by name, optionally remapping its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRef {
    pub rule: String,

    #[serde(default)]
    pub attributes: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
rules:
  - name: vserver-name-present
    category: MISSING_ATTR
    description: vserver must have a name
    severity: CRITICAL
    attributes: [name]
    errorMessage: "vserver name is {0}"
    validate: 'name != null'
  - name: no-message
    category: C
    description: falls back to description
    severity: MINOR
    validate: 'true'
entities:
  - type: vserver
    indexing:
      indices: ["[default]"]
    validations:
      - rule: vserver-name-present
        attributes: [vserver-name]
      - rule: no-message
"#;

    #[test]
    fn parses_rule_file() {
        let file: RuleFile = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(file.rules.len(), 2);
        assert_eq!(file.rules[0].message_template(), "vserver name is {0}");
        assert_eq!(file.rules[1].message_template(), "falls back to description");
        assert!(file.rules[1].attributes.is_empty());

        let entity = &file.entities[0];
        assert_eq!(entity.entity_type, "vserver");
        assert_eq!(entity.indexing.as_ref().unwrap().indices, vec!["[default]"]);
        assert_eq!(
            entity.validations[0].attributes.as_deref(),
            Some(&["vserver-name".to_string()][..])
        );
        assert!(entity.validations[1].attributes.is_none());
    }

    #[test]
    fn empty_file_is_valid() {
        let file: RuleFile = serde_yaml::from_str("{}").unwrap();
        assert_eq!(file, RuleFile::default());
    }

    #[test]
    fn missing_required_field_fails() {
        let err = serde_yaml::from_str::<RuleFile>("rules:\n  - name: x\n    severity: S\n");
        assert!(err.is_err());
    }
}
