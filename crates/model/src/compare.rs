//! Recursive comparison of a reference model against an instance.
//!
//! Every mapping is applied at every level. A relationship mapping keys the
//! model's child nodes and the instance's child objects by model name, reports
//! keys present on one side only, then descends into each remaining key once
//! per (model child, instance child) pair. Cardinality inside a key is not
//! checked.

use std::collections::{BTreeMap, BTreeSet};

use conform_core::path::scalar_text;
use conform_core::settings::ModelSettings;
use conform_core::{AttributePath, Entity, Violation, ViolationBuilder, ViolationType};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::ModelCache;
use crate::error::{ModelError, Result};
use crate::mapping::{Mapping, MappingKind, MappingSet};
use crate::node::ModelNode;

/// A model child: part of the tree being walked, or a sub-model fetched
/// through the cache.
#[derive(Debug, Clone)]
enum Child<'m> {
    Borrowed(&'m Value),
    Fetched(ModelNode),
}

impl Child<'_> {
    fn value(&self) -> &Value {
        match self {
            Child::Borrowed(v) => v,
            Child::Fetched(node) => node.value(),
        }
    }
}

/// Walk state: the entity violations are reported against, the keys leading
/// to the current level, and the accumulator.
struct Walk<'w> {
    entity: &'w Entity,
    trail: Vec<String>,
    out: &'w mut Vec<Violation>,
}

impl Walk<'_> {
    fn location(&self) -> String {
        format!("/{}", self.trail.join("/"))
    }
}

pub struct Comparator<'a> {
    mappings: &'a MappingSet,
    cache: &'a ModelCache,
    max_depth: usize,
    category: &'a str,
    severity: &'a str,
}

impl<'a> Comparator<'a> {
    pub fn new(mappings: &'a MappingSet, cache: &'a ModelCache, settings: &'a ModelSettings) -> Self {
        Self {
            mappings,
            cache,
            max_depth: settings.max_depth,
            category: &settings.category,
            severity: &settings.severity,
        }
    }

    /// Compare `model` with the entity's payload, appending violations to `out`.
    pub fn compare(&self, model: &Value, entity: &Entity, out: &mut Vec<Violation>) -> Result<()> {
        let mut walk = Walk {
            entity,
            trail: Vec::new(),
            out,
        };
        self.compare_level(model, entity.payload(), &mut walk)
    }

    fn compare_level(&self, model: &Value, instance: &Value, walk: &mut Walk<'_>) -> Result<()> {
        if walk.trail.len() > self.max_depth {
            warn!(location = %walk.location(), max_depth = self.max_depth, "comparison depth limit reached");
            return Ok(());
        }

        for mapping in &self.mappings.mappings {
            match mapping.kind {
                MappingKind::Attribute => self.compare_attribute(mapping, model, instance, walk)?,
                MappingKind::Relationship => self.compare_relationship(mapping, model, instance, walk)?,
            }
        }
        Ok(())
    }

    // ── Attributes ──────────────────────────────────────────────────

    fn compare_attribute(
        &self,
        mapping: &Mapping,
        model: &Value,
        instance: &Value,
        walk: &mut Walk<'_>,
    ) -> Result<()> {
        let model_path = required(mapping, mapping.model.value.as_ref(), "model.value")?;
        let instance_path = required(mapping, mapping.instance.value.as_ref(), "instance.value")?;

        let expected: BTreeSet<String> = model_path.texts(model).into_iter().collect();
        if expected.is_empty() {
            return Err(ModelError::Config(format!(
                "attribute mapping '{}' yields no model value at '{}' ({})",
                mapping.name,
                model_path,
                walk.location()
            )));
        }
        let actual: BTreeSet<String> = instance_path.texts(instance).into_iter().collect();

        for value in expected.difference(&actual) {
            let message = format!(
                "missing value '{value}' for attribute '{instance_path}' at {}",
                walk.location()
            );
            self.report(walk, mapping, ViolationType::MissingAttr, message, "value", value);
        }
        for value in actual.difference(&expected) {
            let message = format!(
                "unexpected value '{value}' for attribute '{instance_path}' at {}",
                walk.location()
            );
            self.report(walk, mapping, ViolationType::UnexpectedAttr, message, "value", value);
        }
        Ok(())
    }

    // ── Relationships ───────────────────────────────────────────────

    fn compare_relationship(
        &self,
        mapping: &Mapping,
        model: &Value,
        instance: &Value,
        walk: &mut Walk<'_>,
    ) -> Result<()> {
        let model_children = self.model_children(mapping, model)?;
        let instance_children = instance_children(mapping, instance)?;

        for key in model_children.keys().filter(|k| !instance_children.contains_key(*k)) {
            let message = format!("missing relationship to '{key}' at {}", walk.location());
            self.report(walk, mapping, ViolationType::MissingRel, message, "modelName", key);
        }
        for key in instance_children.keys().filter(|k| !model_children.contains_key(*k)) {
            let message = format!("unexpected relationship to '{key}' at {}", walk.location());
            self.report(walk, mapping, ViolationType::UnexpectedRel, message, "modelName", key);
        }

        for (key, models) in &model_children {
            let Some(instances) = instance_children.get(key) else {
                continue;
            };
            walk.trail.push(key.clone());
            for model_child in models {
                for instance_child in instances {
                    self.compare_level(model_child.value(), instance_child, walk)?;
                }
            }
            walk.trail.pop();
        }
        Ok(())
    }

    /// Model child nodes reachable through the mapping's root, keyed by model name.
    fn model_children<'m>(
        &self,
        mapping: &Mapping,
        model: &'m Value,
    ) -> Result<BTreeMap<String, Vec<Child<'m>>>> {
        let root = required(mapping, mapping.model.root.as_ref(), "model.root")?;
        let mut found = BTreeMap::new();
        for node in root.resolve(model) {
            self.register(mapping, root, Child::Borrowed(node), 0, &mut found)?;
        }
        Ok(found)
    }

    /// Register `child` under its model name(s). A leaf failing the type
    /// filter is first replaced by the sub-model its id points to; a node that
    /// still fails is looked through for valid descendants.
    fn register<'m>(
        &self,
        mapping: &Mapping,
        root: &AttributePath,
        child: Child<'m>,
        descent: usize,
        found: &mut BTreeMap<String, Vec<Child<'m>>>,
    ) -> Result<()> {
        let accepts = |v: &Value| mapping.model.filter.as_ref().map_or(true, |f| f.accepts(v));

        let mut child = child;
        if !accepts(child.value()) && root.resolve(child.value()).is_empty() {
            if let Some(id) = mapping
                .model
                .id
                .as_ref()
                .and_then(|p| p.first(child.value()))
                .map(scalar_text)
                .filter(|id| !id.is_empty())
            {
                match self.cache.get(&id)? {
                    Some(node) => child = Child::Fetched(node),
                    None => debug!(mapping = %mapping.name, model_id = %id, "sub-model not found"),
                }
            }
        }

        if accepts(child.value()) {
            let name_path = required(mapping, mapping.model.model_name.as_ref(), "model.model-name")?;
            let keys = name_path.texts(child.value());
            if keys.is_empty() {
                debug!(mapping = %mapping.name, "model node without a model name skipped");
            }
            for key in keys {
                found.entry(key).or_default().push(child.clone());
            }
            return Ok(());
        }

        if descent >= self.max_depth {
            warn!(mapping = %mapping.name, max_depth = self.max_depth, "model descent depth limit reached");
            return Ok(());
        }

        match child {
            Child::Borrowed(value) => {
                for grandchild in root.resolve(value) {
                    self.register(mapping, root, Child::Borrowed(grandchild), descent + 1, found)?;
                }
            }
            Child::Fetched(node) => {
                for grandchild in root.resolve(node.value()) {
                    let owned = Child::Fetched(ModelNode::new(grandchild.clone()));
                    self.register(mapping, root, owned, descent + 1, found)?;
                }
            }
        }
        Ok(())
    }

    fn report(
        &self,
        walk: &mut Walk<'_>,
        mapping: &Mapping,
        violation_type: ViolationType,
        message: String,
        detail: &str,
        value: &str,
    ) {
        let violation = ViolationBuilder::for_entity(walk.entity)
            .category(self.category)
            .severity(self.severity)
            .violation_type(violation_type)
            .validation_rule(&mapping.name)
            .message(message)
            .detail("location", walk.location())
            .detail(detail, value)
            .build();
        walk.out.push(violation);
    }
}

/// Instance child objects keyed by model name, falling back to entity type.
fn instance_children<'i>(mapping: &Mapping, instance: &'i Value) -> Result<BTreeMap<String, Vec<&'i Value>>> {
    let root = required(mapping, mapping.instance.root.as_ref(), "instance.root")?;
    let key_of = |child: &Value| {
        [&mapping.instance.model_name, &mapping.instance.entity_type]
            .into_iter()
            .flatten()
            .find_map(|p| p.first(child).map(scalar_text).filter(|k| !k.is_empty()))
    };

    let mut found: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for child in root.resolve(instance) {
        match key_of(child) {
            Some(key) => found.entry(key).or_default().push(child),
            None => debug!(mapping = %mapping.name, "instance child without a model name or type skipped"),
        }
    }
    Ok(found)
}

fn required<'p>(mapping: &Mapping, path: Option<&'p AttributePath>, what: &str) -> Result<&'p AttributePath> {
    path.ok_or_else(|| ModelError::Config(format!("mapping '{}' needs {what}", mapping.name)))
}

// ── Tests ───────────────────────────────────────────────────────────
