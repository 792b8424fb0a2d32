//! Action plan loading and validation

use crate::action::ActionSpec;
use crate::registry::ActionRegistry;
use forgeshift_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the plan document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlannedAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl PlannedAction {
    pub fn spec(&self) -> ActionSpec {
        ActionSpec {
            id: self.id.clone(),
            action_type: self.action_type.clone(),
            parameters: self.parameters.clone(),
            idempotency_key: self.idempotency_key.clone(),
        }
    }
}

/// An ordered action plan. Dependencies are implicit in the ordering
/// and in id-mapping lookups at execution time.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionPlan {
    pub actions: Vec<PlannedAction>,
}

impl ActionPlan {
    pub fn from_json(text: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(text)?;
        Ok(plan)
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject a plan whose type tags the registry does not know.
    /// Unknown types are a fatal validation error, never a runtime
    /// lookup failure.
    pub fn validate(&self, registry: &ActionRegistry) -> Result<()> {
        let unknown: Vec<&str> = self
            .actions
            .iter()
            .filter(|action| !registry.knows(&action.action_type))
            .map(|action| action.action_type.as_str())
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "plan contains unknown action types: {}",
                unknown.join(", ")
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_round_trips_as_a_bare_list() {
        let text = r#"[
            {"id": "a1", "type": "label_create", "parameters": {"name": "bug"}},
            {"id": "a2", "type": "issue_create", "parameters": {}, "idempotency_key": "issue-1"}
        ]"#;
        let plan = ActionPlan::from_json(text).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions[0].action_type, "label_create");
        assert_eq!(plan.actions[1].idempotency_key.as_deref(), Some("issue-1"));
    }

    #[test]
    fn unknown_action_type_fails_validation() {
        let registry = ActionRegistry::with_builtin_actions();
        let plan = ActionPlan::from_json(
            r#"[{"id": "a1", "type": "teleport_repo", "parameters": {}}]"#,
        )
        .unwrap();
        let err = plan.validate(&registry).unwrap_err();
        assert!(err.to_string().contains("teleport_repo"));
    }

    #[test]
    fn known_types_validate() {
        let registry = ActionRegistry::with_builtin_actions();
        let plan = ActionPlan::from_json(
            r#"[{"id": "a1", "type": "repo_create", "parameters": {"name": "x"}}]"#,
        )
        .unwrap();
        plan.validate(&registry).unwrap();
    }
}
