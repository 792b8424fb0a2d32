//! Action execution results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationOutcome {
    WouldCreate,
    WouldUpdate,
    WouldSkip,
    WouldExecute,
    WouldFail,
}

/// Outcome of one action, real or simulated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub action_id: String,
    pub action_type: String,
    pub outputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    pub duration_seconds: f64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_outcome: Option<SimulationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_message: Option<String>,
    /// Payload enabling reversal of a successful action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_data: Option<Value>,
    /// Comments and pushed history cannot be undone.
    #[serde(default = "default_reversible")]
    pub reversible: bool,
}

fn default_reversible() -> bool {
    true
}

impl ActionResult {
    fn base(action_id: &str, action_type: &str) -> Self {
        Self {
            success: true,
            action_id: action_id.to_string(),
            action_type: action_type.to_string(),
            outputs: Map::new(),
            error: None,
            retry_count: 0,
            duration_seconds: 0.0,
            timestamp: forgeshift_core::util::now_iso(),
            simulated: false,
            simulation_outcome: None,
            simulation_message: None,
            rollback_data: None,
            reversible: true,
        }
    }

    pub fn ok(action_id: &str, action_type: &str, outputs: Value) -> Self {
        let mut result = Self::base(action_id, action_type);
        result.outputs = outputs.as_object().cloned().unwrap_or_default();
        result
    }

    pub fn failed(action_id: &str, action_type: &str, error: impl Into<String>) -> Self {
        let mut result = Self::base(action_id, action_type);
        result.success = false;
        result.error = Some(error.into());
        result
    }

    pub fn simulated(
        action_id: &str,
        action_type: &str,
        outcome: SimulationOutcome,
        message: impl Into<String>,
        outputs: Value,
    ) -> Self {
        let mut result = Self::base(action_id, action_type);
        result.success = outcome != SimulationOutcome::WouldFail;
        result.outputs = outputs.as_object().cloned().unwrap_or_default();
        result.simulated = true;
        result.simulation_outcome = Some(outcome);
        result.simulation_message = Some(message.into());
        result
    }

    pub fn with_rollback(mut self, rollback_data: Value) -> Self {
        self.rollback_data = Some(rollback_data);
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }

    pub fn set_output(&mut self, key: &str, value: Value) {
        self.outputs.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simulated_skip_is_successful() {
        let result = ActionResult::simulated(
            "a1",
            "label_create",
            SimulationOutcome::WouldSkip,
            "exists",
            json!({"label_name": "bug"}),
        );
        assert!(result.success);
        assert!(result.simulated);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["simulation_outcome"], "would_skip");
    }

    #[test]
    fn would_fail_simulation_is_not_successful() {
        let result = ActionResult::simulated(
            "a1",
            "repo_create",
            SimulationOutcome::WouldFail,
            "no permission",
            json!({}),
        );
        assert!(!result.success);
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let result = ActionResult::ok("a1", "issue_create", json!({"issue_number": 7}));
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("error").is_none());
        assert!(value.get("simulated").is_none());
        assert_eq!(value["outputs"]["issue_number"], 7);
    }
}
