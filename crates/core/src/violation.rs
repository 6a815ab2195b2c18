//! Violations and validation results.
//!
//! A [`Violation`] is produced through [`ViolationBuilder`], which computes
//! the violation id exactly once in [`ViolationBuilder::build`]. The id is a
//! SHA-256 hex digest over the violation's identifying fields. The entity's
//! resource version is deliberately left out so that the same problem seen
//! on a newer snapshot of the entity keeps the same id.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::entity::{Entity, EntityId};
use crate::error::CoreError;

/// Kind of inconsistency a violation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    Rule,
    None,
    NoModel,
    MissingRel,
    UnexpectedRel,
    MissingAttr,
    UnexpectedAttr,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::Rule => "RULE",
            ViolationType::None => "NONE",
            ViolationType::NoModel => "NO_MODEL",
            ViolationType::MissingRel => "MISSING_REL",
            ViolationType::UnexpectedRel => "UNEXPECTED_REL",
            ViolationType::MissingAttr => "MISSING_ATTR",
            ViolationType::UnexpectedAttr => "UNEXPECTED_ATTR",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Violation ───────────────────────────────────────────────────────

/// One detected inconsistency. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    violation_id: String,
    model_name: Option<String>,
    category: String,
    severity: String,
    violation_type: ViolationType,
    validation_rule: Option<String>,
    entity_id: EntityId,
    entity_type: String,
    entity_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_version: Option<String>,
    message: String,
    violation_details: BTreeMap<String, Value>,
}

impl Violation {
    pub fn violation_id(&self) -> &str {
        &self.violation_id
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn severity(&self) -> &str {
        &self.severity
    }

    pub fn violation_type(&self) -> ViolationType {
        self.violation_type
    }

    pub fn validation_rule(&self) -> Option<&str> {
        self.validation_rule.as_deref()
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_link(&self) -> Option<&str> {
        self.entity_link.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn violation_details(&self) -> &BTreeMap<String, Value> {
        &self.violation_details
    }
}

/// Accumulates violation fields; [`build`](Self::build) hashes them into the id.
#[derive(Debug, Clone, Default)]
pub struct ViolationBuilder {
    category: String,
    severity: String,
    violation_type: Option<ViolationType>,
    validation_rule: Option<String>,
    entity_id: EntityId,
    entity_type: String,
    entity_link: Option<String>,
    resource_version: Option<String>,
    message: String,
    details: BTreeMap<String, Value>,
}

impl ViolationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an entity's identity: keys, type, link and resource version.
    pub fn for_entity(entity: &Entity) -> Self {
        Self {
            entity_id: entity.keys().clone(),
            entity_type: entity.entity_type().to_string(),
            entity_link: entity.link().map(str::to_string),
            resource_version: entity.resource_version().map(str::to_string),
            ..Self::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    pub fn violation_type(mut self, violation_type: ViolationType) -> Self {
        self.violation_type = Some(violation_type);
        self
    }

    pub fn validation_rule(mut self, rule: impl Into<String>) -> Self {
        self.validation_rule = Some(rule.into());
        self
    }

    pub fn entity_id(mut self, entity_id: EntityId) -> Self {
        self.entity_id = entity_id;
        self
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    pub fn entity_link(mut self, link: impl Into<String>) -> Self {
        self.entity_link = Some(link.into());
        self
    }

    pub fn resource_version(mut self, resource_version: impl Into<String>) -> Self {
        self.resource_version = Some(resource_version.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Violation {
        let violation_type = self.violation_type.unwrap_or(ViolationType::None);
        let violation_id = compute_violation_id(&self, violation_type);
        Violation {
            violation_id,
            model_name: None,
            category: self.category,
            severity: self.severity,
            violation_type,
            validation_rule: self.validation_rule,
            entity_id: self.entity_id,
            entity_type: self.entity_type,
            entity_link: self.entity_link,
            resource_version: self.resource_version,
            message: self.message,
            violation_details: self.details,
        }
    }
}

/// SHA-256 over the identifying fields, each length-prefixed so that
/// adjacent fields cannot run into one another. `message` and
/// `resource_version` are not identifying.
fn compute_violation_id(b: &ViolationBuilder, violation_type: ViolationType) -> String {
    fn field(hasher: &mut Sha256, name: &str, value: Option<&str>) {
        hasher.update(name.as_bytes());
        match value {
            Some(v) => {
                hasher.update((v.len() as u64).to_be_bytes());
                hasher.update(v.as_bytes());
            }
            None => hasher.update([0xff]),
        }
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, "category", Some(&b.category));
    for (k, v) in &b.entity_id {
        field(&mut hasher, "entityId.key", Some(k));
        field(&mut hasher, "entityId.value", Some(v));
    }
    field(&mut hasher, "entityType", Some(&b.entity_type));
    field(&mut hasher, "entityLink", b.entity_link.as_deref());
    field(&mut hasher, "severity", Some(&b.severity));
    field(&mut hasher, "validationRule", b.validation_rule.as_deref());
    for (k, v) in &b.details {
        field(&mut hasher, "details.key", Some(k));
        field(&mut hasher, "details.value", Some(&v.to_string()));
    }
    field(&mut hasher, "violationType", Some(violation_type.as_str()));

    let digest = hasher.finalize();
    format!("{digest:x}")
}

// ── Validation result ───────────────────────────────────────────────

/// One entity's full validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    validation_id: Uuid,
    #[serde(with = "compact_timestamp")]
    validation_timestamp: DateTime<Utc>,
    entity_id: EntityId,
    entity_type: String,
    entity_link: Option<String>,
    resource_version: Option<String>,
    entity: Value,
    violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn new(entity: &Entity, violations: Vec<Violation>) -> Self {
        Self {
            validation_id: Uuid::new_v4(),
            validation_timestamp: Utc::now().trunc_subsecs(0),
            entity_id: entity.keys().clone(),
            entity_type: entity.entity_type().to_string(),
            entity_link: entity.link().map(str::to_string),
            resource_version: entity.resource_version().map(str::to_string),
            entity: entity.payload().clone(),
            violations,
        }
    }

    /// Final assembly for model-driven validation: every violation collected
    /// during the walk is attributed to the owning model. The violation ids
    /// are not affected.
    pub fn with_model_name(
        entity: &Entity,
        mut violations: Vec<Violation>,
        model_name: Option<&str>,
    ) -> Self {
        for v in &mut violations {
            v.model_name = model_name.map(str::to_string);
        }
        Self::new(entity, violations)
    }

    pub fn validation_id(&self) -> Uuid {
        self.validation_id
    }

    pub fn validation_timestamp(&self) -> DateTime<Utc> {
        self.validation_timestamp
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_link(&self) -> Option<&str> {
        self.entity_link.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }

    pub fn entity(&self) -> &Value {
        &self.entity
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `validationTimestamp` is written as basic ISO 8601 in UTC, e.g.
/// `20261019T101010Z`.
mod compact_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y%m%dT%H%M%SZ";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
