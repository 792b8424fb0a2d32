//! CI/CD deployment actions

use super::manual_follow_up;
use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::ActionResult;
use base64::Engine;
use forgeshift_client::GitHubClient;
use serde_json::json;

const DEFAULT_WORKFLOW_PATH: &str = ".github/workflows/ci.yml";

/// `workflow_commit` — commit the converted workflow file.
pub struct CommitWorkflowAction {
    spec: ActionSpec,
}

impl CommitWorkflowAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }

    /// The plan either carries a converted workflow or the raw source
    /// CI document; the latter runs through the CI transformer here.
    fn resolve_workflow_yaml(&self) -> Result<(String, Vec<serde_json::Value>), String> {
        if let Some(yaml) = self.spec.param_str("workflow_yaml") {
            return Ok((yaml.to_string(), Vec::new()));
        }
        let Some(source_ci) = self.spec.param_str("gitlab_ci_yaml") else {
            return Err("missing required parameter: workflow_yaml or gitlab_ci_yaml".to_string());
        };

        let outcome =
            forgeshift_transform::cicd::transform_ci(&serde_json::Value::String(source_ci.into()));
        if !outcome.success {
            let messages: Vec<String> =
                outcome.errors.iter().map(|e| e.message.clone()).collect();
            return Err(format!("CI conversion failed: {}", messages.join("; ")));
        }
        let yaml = outcome
            .data
            .as_ref()
            .and_then(|data| data["workflow_yaml"].as_str())
            .unwrap_or_default()
            .to_string();
        let gaps = outcome
            .metadata
            .get("conversion_gaps")
            .and_then(|gaps| gaps.as_array())
            .cloned()
            .unwrap_or_default();
        Ok((yaml, gaps))
    }
}

#[async_trait::async_trait]
impl Action for CommitWorkflowAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let (workflow_yaml, conversion_gaps) = match self.resolve_workflow_yaml() {
            Ok(resolved) => resolved,
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let path = self
            .spec
            .param_str("workflow_path")
            .unwrap_or(DEFAULT_WORKFLOW_PATH);

        let encoded = base64::engine::general_purpose::STANDARD.encode(workflow_yaml.as_bytes());
        match client
            .put_contents(
                &target,
                path,
                "Add converted CI workflow",
                &encoded,
                self.spec.param_str("branch"),
            )
            .await
        {
            Ok(result) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({
                    "target_repo": target,
                    "workflow_path": path,
                    "commit_sha": result["commit"]["sha"],
                    "conversion_gaps": conversion_gaps,
                }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}

/// `environment_create` — create a deployment environment.
pub struct CreateEnvironmentAction {
    spec: ActionSpec,
}

impl CreateEnvironmentAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CreateEnvironmentAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let name = match self.spec.require_str("name") {
            Ok(name) => name.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };

        match client.create_environment(&target, &name).await {
            Ok(_) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "target_repo": target, "environment": name }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}

/// `secret_set` — secret values are never exported from the source, so
/// this is always a manual follow-up.
pub struct SetSecretAction {
    spec: ActionSpec,
}

impl SetSecretAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for SetSecretAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, _client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let name = self.spec.param_str("name").unwrap_or("?");
        manual_follow_up(
            &self.spec,
            &format!("Secret '{name}' must be set manually; values are never exported"),
        )
    }
}

/// `variable_set` — recreate a CI variable when a value was supplied,
/// otherwise a manual follow-up.
pub struct SetVariableAction {
    spec: ActionSpec,
}

impl SetVariableAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for SetVariableAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let name = match self.spec.require_str("name") {
            Ok(name) => name.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let Some(value) = self.spec.param_str("value") else {
            return manual_follow_up(
                &self.spec,
                &format!("Variable '{name}' has no exported value; set it manually"),
            );
        };

        match client.create_actions_variable(&target, &name, value).await {
            Ok(_) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "target_repo": target, "variable": name }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}
