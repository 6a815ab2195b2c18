use serde_json::Value;

use crate::error::ValidationError;
use crate::violation::ValidationResult;

/// A validation engine the dispatcher can route events to.
///
/// `initialise` is called once, before the engine is shared; `validate` may
/// then be called concurrently from many threads.
pub trait Validator: Send + Sync {
    /// Short engine name used in logs and counters.
    fn name(&self) -> &str;

    /// Load and compile configuration. Calling `validate` on an engine that
    /// was never initialised fails with [`ValidationError::NotInitialised`].
    fn initialise(&mut self) -> Result<(), ValidationError>;

    /// Validate one parsed event. `source` is a free-form label of where the
    /// event came from.
    fn validate(&self, event: &Value, source: &str)
        -> Result<Vec<ValidationResult>, ValidationError>;
}
