//! Rule engine: YAML rule definitions compiled into expression predicates.
//!
//! This crate provides:
//! - A small expression language (lexer, parser, evaluator) for rule predicates
//! - YAML rule schema and a filesystem loader grouping files by event type
//! - Rule compilation with attribute-name checks and a placeholder self-test
//! - Per-event-type rule index, optionally keyed by entity attribute values
//! - [`RuleValidator`], the engine behind the `Validator` trait

pub mod error;
pub mod expr;
pub mod index;
pub mod loader;
pub mod rule;
pub mod schema;
pub mod validator;

pub use error::{Result, RuleError};
pub use index::{index_key, IndexStats, RuleIndex};
pub use loader::{LoadResult, LoadStatus, RuleLoader, RuleSources};
pub use rule::{ResultShape, RuleDef, RuleResult};
pub use schema::{EntitySection, RuleConfig, RuleFile, ValidationRef};
pub use validator::RuleValidator;
