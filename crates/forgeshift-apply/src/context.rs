//! Execution-scoped apply context
//!
//! Typed fields instead of a loose shared map: credentials, the
//! executed-action record keyed by idempotency key, and id mappings
//! for cross-action reference resolution. Apply is single-writer, so
//! none of this needs locking; if parallel execution is ever
//! introduced, each field takes its own mutex.

use crate::result::ActionResult;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub destination_token: String,
}

#[derive(Debug, Default)]
pub struct ApplyContext {
    pub credentials: Credentials,
    executed: HashMap<String, ActionResult>,
    id_mappings: HashMap<String, HashMap<String, Value>>,
}

impl ApplyContext {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            executed: HashMap::new(),
            id_mappings: HashMap::new(),
        }
    }

    /// Previously recorded result for an idempotency key.
    pub fn executed(&self, idempotency_key: &str) -> Option<&ActionResult> {
        self.executed.get(idempotency_key)
    }

    pub fn record_executed(&mut self, idempotency_key: &str, result: ActionResult) {
        self.executed.insert(idempotency_key.to_string(), result);
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    /// Resolve a destination id recorded earlier in the plan, e.g. the
    /// issue number created for a source issue id.
    pub fn id_mapping(&self, entity_type: &str, source_id: &str) -> Option<&Value> {
        self.id_mappings.get(entity_type)?.get(source_id)
    }

    pub fn set_id_mapping(&mut self, entity_type: &str, source_id: &str, destination_id: Value) {
        self.id_mappings
            .entry(entity_type.to_string())
            .or_default()
            .insert(source_id.to_string(), destination_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_mappings_resolve_by_type_and_source_id() {
        let mut ctx = ApplyContext::default();
        ctx.set_id_mapping("issue", "42", json!(7));
        assert_eq!(ctx.id_mapping("issue", "42"), Some(&json!(7)));
        assert_eq!(ctx.id_mapping("issue", "43"), None);
        assert_eq!(ctx.id_mapping("release", "42"), None);
    }

    #[test]
    fn executed_actions_are_recorded_by_key() {
        let mut ctx = ApplyContext::default();
        assert!(ctx.executed("key-1").is_none());
        ctx.record_executed(
            "key-1",
            ActionResult::ok("a1", "label_create", json!({})),
        );
        assert!(ctx.executed("key-1").is_some());
        assert_eq!(ctx.executed_count(), 1);
    }
}
