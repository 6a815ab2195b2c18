//! Shared, read-only reference model trees.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;

/// A parsed reference model. Cloning shares the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode(Arc<Value>);

impl ModelNode {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Whether two handles share the same tree.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ModelNode {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for ModelNode {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
