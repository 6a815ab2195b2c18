//! Model/instance mapping definitions.
//!
//! ```yaml
//! mappings:
//!   - name: model-elements
//!     kind: relationship
//!     model:
//!       root: model-elements.model-element[*]
//!       model-name: model-name
//!       id: model-version-id
//!       filter: { path: model-type, valid: [resource, service] }
//!     instance:
//!       root: relationship-list.relationship[*]
//!       model-name: related-to-model-name
//!       entity-type: related-to
//!   - name: invariant-id
//!     kind: attribute
//!     model: { value: model-invariant-id }
//!     instance: { value: model-invariant-id }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use conform_core::AttributePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

/// Every mapping applied at each level of a comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSet {
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    /// Compare a set of values read at the current level.
    Attribute,
    /// Compare child nodes keyed by model name, then recurse into them.
    Relationship,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub name: String,
    pub kind: MappingKind,
    pub model: ModelPaths,
    pub instance: InstancePaths,
}

/// Where a mapping looks inside a reference model node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelPaths {
    /// Child nodes (relationship).
    #[serde(default)]
    pub root: Option<AttributePath>,

    /// Key of a child node (relationship).
    #[serde(default)]
    pub model_name: Option<AttributePath>,

    /// Id of the full model behind a leaf child (relationship).
    #[serde(default)]
    pub id: Option<AttributePath>,

    /// Which child nodes count on their own (relationship).
    #[serde(default)]
    pub filter: Option<TypeFilter>,

    /// Compared value (attribute).
    #[serde(default)]
    pub value: Option<AttributePath>,
}

/// Where a mapping looks inside an instance object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstancePaths {
    #[serde(default)]
    pub root: Option<AttributePath>,

    /// Key of a child object; falls back to `entity-type`.
    #[serde(default)]
    pub model_name: Option<AttributePath>,

    #[serde(default)]
    pub entity_type: Option<AttributePath>,

    #[serde(default)]
    pub value: Option<AttributePath>,
}

/// Accepts nodes whose `path` value is one of `valid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeFilter {
    pub path: AttributePath,
    pub valid: Vec<String>,
}

impl TypeFilter {
    pub fn accepts(&self, node: &Value) -> bool {
        self.path
            .texts(node)
            .iter()
            .any(|t| self.valid.iter().any(|v| v == t))
    }
}

impl MappingSet {
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Read and check a mapping file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let set = Self::from_yaml(&content).map_err(|source| ModelError::Mapping {
            path: path.to_path_buf(),
            source,
        })?;
        set.validate()?;
        Ok(set)
    }

    /// Check each mapping carries the paths its kind needs.
    pub fn validate(&self) -> Result<()> {
        if self.mappings.is_empty() {
            return Err(ModelError::Config("no mappings defined".to_string()));
        }

        let mut names = HashSet::new();
        for mapping in &self.mappings {
            if !names.insert(mapping.name.as_str()) {
                return Err(ModelError::Config(format!(
                    "mapping '{}' is defined more than once",
                    mapping.name
                )));
            }
            mapping.validate()?;
        }
        Ok(())
    }
}

impl Mapping {
    fn validate(&self) -> Result<()> {
        let missing = |what: &str| -> Result<()> {
            Err(ModelError::Config(format!(
                "{} mapping '{}' needs {what}",
                self.kind_label(),
                self.name
            )))
        };

        match self.kind {
            MappingKind::Attribute => {
                if self.model.value.is_none() {
                    return missing("model.value");
                }
                if self.instance.value.is_none() {
                    return missing("instance.value");
                }
            }
            MappingKind::Relationship => {
                if self.model.root.is_none() {
                    return missing("model.root");
                }
                if self.model.model_name.is_none() {
                    return missing("model.model-name");
                }
                if self.instance.root.is_none() {
                    return missing("instance.root");
                }
                if self.instance.model_name.is_none() && self.instance.entity_type.is_none() {
                    return missing("instance.model-name or instance.entity-type");
                }
            }
        }
        Ok(())
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            MappingKind::Attribute => "attribute",
            MappingKind::Relationship => "relationship",
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
mappings:
  - name: model-elements
    kind: relationship
    model:
      root: model-elements.model-element[*]
      model-name: model-name
      id: model-version-id
      filter: { path: model-type, valid: [resource, service] }
    instance:
      root: relationship-list.relationship[*]
      model-name: related-to-model-name
      entity-type: related-to
  - name: invariant-id
    kind: attribute
    model: { value: model-invariant-id }
    instance: { value: model-invariant-id }
"#;

    #[test]
    fn parses_and_validates() {
        let set = MappingSet::from_yaml(SAMPLE).unwrap();
        set.validate().unwrap();
        assert_eq!(set.mappings.len(), 2);

        let rel = &set.mappings[0];
        assert_eq!(rel.kind, MappingKind::Relationship);
        assert_eq!(rel.model.root.as_ref().unwrap().as_str(), "model-elements.model-element[*]");
        assert_eq!(rel.instance.entity_type.as_ref().unwrap().as_str(), "related-to");
        assert_eq!(set.mappings[1].kind, MappingKind::Attribute);
    }

    #[test]
    fn relationship_needs_roots() {
        let yaml = r#"
mappings:
  - name: broken
    kind: relationship
    model: { model-name: model-name }
    instance: { root: children }
"#;
        let set = MappingSet::from_yaml(yaml).unwrap();
        let err = set.validate().unwrap_err();
        assert!(err.to_string().contains("model.root"));
    }

    #[test]
    fn duplicate_names_and_empty_sets_are_rejected() {
        assert!(MappingSet::default().validate().is_err());

        let yaml = r#"
mappings:
  - { name: a, kind: attribute, model: { value: x }, instance: { value: x } }
  - { name: a, kind: attribute, model: { value: y }, instance: { value: y } }
"#;
        assert!(MappingSet::from_yaml(yaml).unwrap().validate().is_err());
    }

    #[test]
    fn type_filter_matches_any_value() {
        let filter = TypeFilter {
            path: AttributePath::parse("model-type").unwrap(),
            valid: vec!["resource".into(), "service".into()],
        };
        assert!(filter.accepts(&json!({"model-type": "service"})));
        assert!(!filter.accepts(&json!({"model-type": "widget"})));
        assert!(!filter.accepts(&json!({})));
    }
}
