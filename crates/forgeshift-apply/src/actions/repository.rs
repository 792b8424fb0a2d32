//! Repository lifecycle actions

use super::{manual_follow_up, push_url, run_git};
use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::{ActionResult, SimulationOutcome};
use base64::Engine;
use forgeshift_client::GitHubClient;
use serde_json::{json, Value};
use std::path::Path;

/// `repo_create` — create the destination repository.
pub struct CreateRepositoryAction {
    spec: ActionSpec,
}

impl CreateRepositoryAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }

    fn full_name(&self) -> Result<String, String> {
        let owner = self
            .spec
            .param_str("org")
            .or_else(|| self.spec.param_str("owner"))
            .ok_or("missing required parameter: org or owner")?;
        let name = self.spec.require_str("name")?;
        Ok(format!("{owner}/{name}"))
    }
}

#[async_trait::async_trait]
impl Action for CreateRepositoryAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn simulate(&self, client: &GitHubClient, _ctx: &ApplyContext) -> ActionResult {
        let full_name = match self.full_name() {
            Ok(full_name) => full_name,
            Err(e) => {
                return ActionResult::simulated(
                    &self.spec.id,
                    &self.spec.action_type,
                    SimulationOutcome::WouldFail,
                    format!("Would fail: {e}"),
                    json!({}),
                )
            }
        };

        match client.get_repo(&full_name).await {
            Ok(response) if response.is_success() => ActionResult::simulated(
                &self.spec.id,
                &self.spec.action_type,
                SimulationOutcome::WouldSkip,
                format!("Repository '{full_name}' already exists, would skip creation"),
                json!({ "repo_full_name": full_name, "exists": true }),
            ),
            Ok(response) if response.status == 404 => ActionResult::simulated(
                &self.spec.id,
                &self.spec.action_type,
                SimulationOutcome::WouldCreate,
                format!("Would create repository '{full_name}'"),
                json!({ "repo_full_name": full_name }),
            ),
            Ok(response) => ActionResult::simulated(
                &self.spec.id,
                &self.spec.action_type,
                SimulationOutcome::WouldFail,
                format!("Would fail: HTTP {}", response.status),
                json!({}),
            ),
            Err(e) => ActionResult::simulated(
                &self.spec.id,
                &self.spec.action_type,
                SimulationOutcome::WouldFail,
                format!("Would fail: {e}"),
                json!({}),
            ),
        }
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let full_name = match self.full_name() {
            Ok(full_name) => full_name,
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let org = self.spec.param_str("org");
        let payload = json!({
            "name": self.spec.param_str("name"),
            "description": self.spec.param_str("description").unwrap_or(""),
            "homepage": self.spec.param_str("homepage").unwrap_or(""),
            "private": self.spec.parameters["private"].as_bool().unwrap_or(true),
            "has_issues": self.spec.parameters["has_issues"].as_bool().unwrap_or(true),
            "has_projects": self.spec.parameters["has_projects"].as_bool().unwrap_or(true),
            "has_wiki": self.spec.parameters["has_wiki"].as_bool().unwrap_or(true),
            "auto_init": self.spec.parameters["auto_init"].as_bool().unwrap_or(false),
        });

        match client.create_repo(org, &payload).await {
            Ok(repo) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({
                    "repo_full_name": repo["full_name"].as_str().unwrap_or(&full_name),
                    "repo_url": repo["html_url"],
                    "repo_id": repo["id"],
                }),
            )
            .with_rollback(json!({
                "repo_full_name": repo["full_name"].as_str().unwrap_or(&full_name),
            })),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }

    async fn rollback(&self, client: &GitHubClient, rollback_data: &Value) -> Result<(), String> {
        let full_name = rollback_data["repo_full_name"]
            .as_str()
            .ok_or("rollback data missing repo_full_name")?;
        client
            .delete_repo(full_name)
            .await
            .map_err(|e| e.to_string())
    }
}

/// `repo_push` — mirror-push the exported repository. Pushed history
/// is irreversible.
pub struct PushCodeAction {
    spec: ActionSpec,
}

impl PushCodeAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for PushCodeAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn is_reversible(&self) -> bool {
        false
    }

    async fn simulate(&self, _client: &GitHubClient, _ctx: &ApplyContext) -> ActionResult {
        let target = self.spec.param_str("target_repo").unwrap_or("?");
        ActionResult::simulated(
            &self.spec.id,
            &self.spec.action_type,
            SimulationOutcome::WouldExecute,
            format!("Would mirror-push the repository to '{target}'"),
            json!({ "target_repo": target }),
        )
    }

    async fn execute(&self, _client: &GitHubClient, ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let source_dir = match self.spec.require_str("source_dir") {
            Ok(dir) => dir.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        if !Path::new(&source_dir).exists() {
            return ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                format!("source repository directory not found: {source_dir}"),
            );
        }

        let url = push_url(&ctx.credentials.destination_token, &target, "");
        match run_git(&["push", "--mirror", &url], Path::new(&source_dir)).await {
            Ok(_) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "target_repo": target, "pushed": true }),
            )
            .irreversible(),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        }
    }
}

/// `lfs_configure` — push LFS objects alongside the mirrored history.
pub struct PushLfsAction {
    spec: ActionSpec,
}

impl PushLfsAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for PushLfsAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn is_reversible(&self) -> bool {
        false
    }

    async fn execute(&self, _client: &GitHubClient, ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let source_dir = match self.spec.require_str("source_dir") {
            Ok(dir) => dir.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };

        let url = push_url(&ctx.credentials.destination_token, &target, "");
        match run_git(&["lfs", "push", "--all", &url], Path::new(&source_dir)).await {
            Ok(_) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "target_repo": target, "lfs_pushed": true }),
            )
            .irreversible(),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        }
    }
}

/// `repo_configure` — apply repository settings on the destination.
pub struct ConfigureRepositoryAction {
    spec: ActionSpec,
}

impl ConfigureRepositoryAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for ConfigureRepositoryAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let settings = &self.spec.parameters["settings"];
        if !settings.is_object() {
            return manual_follow_up(
                &self.spec,
                "No mappable settings supplied; review repository settings manually",
            );
        }

        match client.update_repo(&target, settings).await {
            Ok(_) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "target_repo": target, "settings_applied": true }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}

/// `gitmodules_update` — commit the rewritten `.gitmodules`.
pub struct UpdateGitmodulesAction {
    spec: ActionSpec,
}

impl UpdateGitmodulesAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for UpdateGitmodulesAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let content = match self.spec.require_str("gitmodules_content") {
            Ok(content) => content.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };

        let encoded = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
        match client
            .put_contents(
                &target,
                ".gitmodules",
                "Rewrite submodule URLs for migrated repositories",
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
                    "commit_sha": result["commit"]["sha"],
                }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}
