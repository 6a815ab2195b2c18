//! Shared data model for entity-change validation.
//!
//! - [`path`]: dotted attribute paths over JSON payloads
//! - [`entity`]: extracted entities and their attribute values
//! - [`event`]: event header reader and the JSON entity extractor
//! - [`violation`]: violations, their deterministic ids, and validation results
//! - [`validator`]: the engine contract shared by the rule and model engines
//! - [`config`] / [`settings`]: process and engine configuration

pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod path;
pub mod settings;
pub mod validator;
pub mod violation;

pub use config::Config;
pub use entity::*;
pub use error::*;
pub use event::{parse_event, EntityExtractor, EventReader};
pub use path::AttributePath;
pub use settings::Settings;
pub use validator::Validator;
pub use violation::*;
