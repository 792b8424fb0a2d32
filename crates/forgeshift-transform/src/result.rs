//! Common transformation result shape

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One error or warning raised by a transformer, with its context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, context: Value) -> Self {
        Self {
            message: message.into(),
            context,
        }
    }
}

/// Result of a transformation: data plus accumulated diagnostics.
/// Callers decide whether warnings should be treated as failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub metadata: Map<String, Value>,
    pub timestamp: String,
}

impl TransformOutcome {
    pub fn new() -> Self {
        Self {
            success: true,
            data: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: Map::new(),
            timestamp: forgeshift_core::util::now_iso(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>, context: Value) {
        self.errors.push(Diagnostic::new(message, context));
        self.success = false;
    }

    pub fn add_warning(&mut self, message: impl Into<String>, context: Value) {
        self.warnings.push(Diagnostic::new(message, context));
    }

    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }
}

impl Default for TransformOutcome {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn errors_flip_success() {
        let mut outcome = TransformOutcome::new();
        assert!(outcome.success);
        outcome.add_warning("just a note", Value::Null);
        assert!(outcome.success);
        outcome.add_error("broken", json!({"field": "x"}));
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
    }
}
