//! Compiled rules grouped per event type.
//!
//! Most event types group their rules by entity type. An indexed event type
//! instead registers rules under value keys: the entity's values for the
//! configured attributes, sorted and concatenated as `"[v1][v2]"`.

use std::collections::{BTreeSet, HashMap};

use conform_core::settings::IndexSettings;
use conform_core::{AttributePath, Entity};
use tracing::{debug, info, warn};

use crate::error::{Result, RuleError};
use crate::loader::RuleSources;
use crate::rule::RuleDef;
use crate::schema::{RuleConfig, RuleFile};

#[derive(Debug)]
enum RuleTable {
    ByEntityType(HashMap<String, Vec<RuleDef>>),
    Indexed {
        attributes: Vec<AttributePath>,
        default_key: Option<String>,
        by_key: HashMap<String, Vec<RuleDef>>,
    },
}

/// Counts gathered while building an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub compiled: usize,
    pub invalid: usize,
}

/// Immutable rule lookup built once at initialisation.
#[derive(Debug)]
pub struct RuleIndex {
    tables: HashMap<String, RuleTable>,
    stats: IndexStats,
}

impl RuleIndex {
    /// Compile the rules of every event type.
    ///
    /// Event types are those with their own folder plus `extra_event_types`
    /// (which then only see the common files).
    pub fn build(
        sources: &RuleSources,
        extra_event_types: &[String],
        indexed: &HashMap<String, IndexSettings>,
    ) -> Result<Self> {
        let event_types: BTreeSet<&str> = sources
            .event_types()
            .chain(extra_event_types.iter().map(String::as_str))
            .collect();

        let mut tables = HashMap::new();
        let mut stats = IndexStats::default();

        for event_type in event_types {
            let files = sources.files_for(event_type);
            let table = build_table(event_type, &files, indexed.get(event_type), &mut stats)?;
            tables.insert(event_type.to_string(), table);
        }

        info!(
            event_types = tables.len(),
            compiled = stats.compiled,
            invalid = stats.invalid,
            "rule index built"
        );
        Ok(Self { tables, stats })
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Rules to run for `entity` under `event_type`.
    ///
    /// A non-indexed event type with nothing registered for the entity type
    /// yields no rules. An indexed event type falls back to its default key
    /// and fails with [`RuleError::RulesNotDefined`] when that is missing too.
    pub fn select(&self, event_type: &str, entity: &Entity) -> Result<&[RuleDef]> {
        let Some(table) = self.tables.get(event_type) else {
            return Err(RuleError::RulesNotDefined {
                event_type: event_type.to_string(),
                key: entity.entity_type().to_string(),
            });
        };

        match table {
            RuleTable::ByEntityType(by_type) => Ok(by_type
                .get(entity.entity_type())
                .map(Vec::as_slice)
                .unwrap_or(&[])),
            RuleTable::Indexed {
                attributes,
                default_key,
                by_key,
            } => {
                let key = index_key(attributes, entity);
                if let Some(rules) = by_key.get(&key) {
                    return Ok(rules);
                }
                if let Some(rules) = default_key.as_ref().and_then(|d| by_key.get(d)) {
                    debug!(event_type, key = %key, "no rules under index key, using default");
                    return Ok(rules);
                }
                Err(RuleError::RulesNotDefined {
                    event_type: event_type.to_string(),
                    key,
                })
            }
        }
    }
}

/// Sorted `"[v1][v2]"` key over the entity's values for `attributes`.
/// Absent attributes contribute nothing.
pub fn index_key(attributes: &[AttributePath], entity: &Entity) -> String {
    let mut values: Vec<String> = attributes.iter().flat_map(|a| entity.texts(a)).collect();
    values.sort();
    values.iter().map(|v| format!("[{v}]")).collect()
}

fn build_table(
    event_type: &str,
    files: &[&RuleFile],
    index: Option<&IndexSettings>,
    stats: &mut IndexStats,
) -> Result<RuleTable> {
    // Later definitions of a name override earlier ones.
    let mut rules: HashMap<&str, &RuleConfig> = HashMap::new();
    for rule in files.iter().flat_map(|f| &f.rules) {
        if rules.insert(rule.name.as_str(), rule).is_some() {
            debug!(event_type, rule = %rule.name, "rule definition overridden");
        }
    }

    let mut grouped: HashMap<String, Vec<RuleDef>> = HashMap::new();

    for section in files.iter().flat_map(|f| &f.entities) {
        let targets: Vec<String> = match index {
            None => vec![section.entity_type.clone()],
            Some(_) => match &section.indexing {
                Some(ix) if !ix.indices.is_empty() => ix.indices.clone(),
                _ => {
                    warn!(
                        event_type,
                        entity_type = %section.entity_type,
                        "entity section has no index keys on an indexed event type, skipped"
                    );
                    continue;
                }
            },
        };

        for validation in &section.validations {
            let rule = rules.get(validation.rule.as_str()).ok_or_else(|| {
                RuleError::Config(format!(
                    "entity '{}' of event type '{}' references unknown rule '{}'",
                    section.entity_type, event_type, validation.rule
                ))
            })?;

            let def = RuleDef::compile(rule, validation.attributes.as_deref())?;
            if !def.is_valid() {
                stats.invalid += 1;
                continue;
            }
            stats.compiled += 1;
            for target in &targets {
                grouped.entry(target.clone()).or_default().push(def.clone());
            }
        }
    }

    Ok(match index {
        None => RuleTable::ByEntityType(grouped),
        Some(settings) => RuleTable::Indexed {
            attributes: settings.attributes.clone(),
            default_key: settings.default_key.clone(),
            by_key: grouped,
        },
    })
}
