//! Model engine: compares entities against cached reference model trees.
//!
//! - [`provider`]: where reference models come from (files, HTTP)
//! - [`cache`]: TTL-bounded model cache in front of a provider
//! - [`mapping`]: which model and instance paths correspond
//! - [`compare`]: the recursive model/instance comparator
//! - [`validator`]: [`ModelValidator`], the engine behind the `Validator` trait

pub mod cache;
pub mod compare;
pub mod error;
pub mod mapping;
pub mod node;
pub mod provider;
pub mod validator;

pub use cache::ModelCache;
pub use compare::Comparator;
pub use error::{ModelError, Result};
pub use mapping::{Mapping, MappingKind, MappingSet, TypeFilter};
pub use node::ModelNode;
pub use provider::{provider_from_settings, FileModelProvider, HttpModelProvider, ModelProvider};
pub use validator::ModelValidator;
