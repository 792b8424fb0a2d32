//! Destination settings actions

use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::ActionResult;
use forgeshift_client::GitHubClient;
use serde_json::{json, Value};

/// `protection_set` — apply a branch protection rule produced by the
/// protections transformer.
pub struct SetBranchProtectionAction {
    spec: ActionSpec,
}

impl SetBranchProtectionAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for SetBranchProtectionAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let branch = match self.spec.require_str("branch") {
            Ok(branch) => branch.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let protection = &self.spec.parameters["protection"];
        if !protection.is_object() {
            return ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                "missing required parameter: protection",
            );
        }

        match client.put_branch_protection(&target, &branch, protection).await {
            Ok(_) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "target_repo": target, "branch": branch }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}

/// `collaborator_add` — invite a collaborator; rollback removes them.
pub struct AddCollaboratorAction {
    spec: ActionSpec,
}

impl AddCollaboratorAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for AddCollaboratorAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let username = match self.spec.require_str("username") {
            Ok(username) => username.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let permission = self.spec.param_str("permission").unwrap_or("push");

        match client.add_collaborator(&target, &username, permission).await {
            Ok(response) if response.is_success() || response.status == 204 => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({
                    "target_repo": target,
                    "username": username,
                    "permission": permission,
                }),
            )
            .with_rollback(json!({ "target_repo": target, "username": username })),
            Ok(response) => ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                format!("collaborator invite failed: HTTP {}", response.status),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }

    async fn rollback(&self, client: &GitHubClient, rollback_data: &Value) -> Result<(), String> {
        let target = rollback_data["target_repo"]
            .as_str()
            .ok_or("rollback data missing target_repo")?;
        let username = rollback_data["username"]
            .as_str()
            .ok_or("rollback data missing username")?;
        client
            .remove_collaborator(target, username)
            .await
            .map_err(|e| e.to_string())
    }
}

/// `webhook_create` — create a webhook from the transformer output;
/// rollback deletes it. Secrets are never carried from the source.
pub struct CreateWebhookAction {
    spec: ActionSpec,
}

impl CreateWebhookAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CreateWebhookAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let url = match self.spec.require_str("url") {
            Ok(url) => url.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let events = self
            .spec
            .parameters
            .get("events")
            .cloned()
            .unwrap_or_else(|| json!(["push"]));

        let payload = json!({
            "config": {
                "url": url,
                "content_type": "json",
                "insecure_ssl": if self.spec.parameters["insecure_ssl"].as_bool().unwrap_or(false) { "1" } else { "0" },
            },
            "events": events,
            "active": self.spec.parameters["active"].as_bool().unwrap_or(true),
        });

        match client.create_hook(&target, &payload).await {
            Ok(hook) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({
                    "hook_id": hook["id"],
                    "target_repo": target,
                    "url": url,
                }),
            )
            .with_rollback(json!({ "target_repo": target, "hook_id": hook["id"] })),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }

    async fn rollback(&self, client: &GitHubClient, rollback_data: &Value) -> Result<(), String> {
        let target = rollback_data["target_repo"]
            .as_str()
            .ok_or("rollback data missing target_repo")?;
        let hook_id = rollback_data["hook_id"]
            .as_u64()
            .ok_or("rollback data missing hook_id")?;
        client
            .delete_hook(target, hook_id)
            .await
            .map_err(|e| e.to_string())
    }
}
