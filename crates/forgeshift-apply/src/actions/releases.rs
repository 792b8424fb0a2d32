//! Release actions

use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::ActionResult;
use forgeshift_client::GitHubClient;
use serde_json::{json, Value};

/// `release_create` — create a destination release and record the
/// source-release to destination-id mapping for asset uploads.
pub struct CreateReleaseAction {
    spec: ActionSpec,
}

impl CreateReleaseAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CreateReleaseAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let tag_name = match self.spec.require_str("tag_name") {
            Ok(tag) => tag.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };

        let payload = json!({
            "tag_name": tag_name,
            "name": self.spec.param_str("name").unwrap_or(&tag_name),
            "body": self.spec.param_str("body").unwrap_or(""),
            "draft": self.spec.parameters["draft"].as_bool().unwrap_or(false),
            "prerelease": self.spec.parameters["prerelease"].as_bool().unwrap_or(false),
        });

        match client.create_release(&target, &payload).await {
            Ok(release) => {
                let release_id = release["id"].clone();
                ctx.set_id_mapping("release", &tag_name, release_id.clone());
                if let Some(source_id) = self.spec.parameters["gitlab_release_id"]
                    .as_u64()
                    .map(|id| id.to_string())
                {
                    ctx.set_id_mapping("release", &source_id, release_id.clone());
                }
                ActionResult::ok(
                    &self.spec.id,
                    &self.spec.action_type,
                    json!({
                        "release_id": release_id,
                        "release_url": release["html_url"],
                        "tag_name": tag_name,
                    }),
                )
                .with_rollback(json!({
                    "target_repo": target,
                    "release_id": release_id,
                }))
            }
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }

    async fn rollback(&self, client: &GitHubClient, rollback_data: &Value) -> Result<(), String> {
        let target = rollback_data["target_repo"]
            .as_str()
            .ok_or("rollback data missing target_repo")?;
        let release_id = rollback_data["release_id"]
            .as_u64()
            .ok_or("rollback data missing release_id")?;
        client
            .delete_release(target, release_id)
            .await
            .map_err(|e| e.to_string())
    }
}

/// `release_asset_upload` — upload one asset to a release created
/// earlier in the plan, resolved through the release id mapping.
pub struct UploadReleaseAssetAction {
    spec: ActionSpec,
}

impl UploadReleaseAssetAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }

    fn resolve_release_id(&self, ctx: &ApplyContext) -> Option<u64> {
        if let Some(id) = self.spec.parameters["release_id"].as_u64() {
            return Some(id);
        }
        let key = self
            .spec
            .param_str("tag_name")
            .map(String::from)
            .or_else(|| {
                self.spec.parameters["gitlab_release_id"]
                    .as_u64()
                    .map(|id| id.to_string())
            })?;
        ctx.id_mapping("release", &key)?.as_u64()
    }
}

#[async_trait::async_trait]
impl Action for UploadReleaseAssetAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let asset_path = match self.spec.require_str("asset_path") {
            Ok(path) => path.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let asset_name = self
            .spec
            .param_str("asset_name")
            .map(String::from)
            .unwrap_or_else(|| {
                std::path::Path::new(&asset_path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "asset".to_string())
            });

        let Some(release_id) = self.resolve_release_id(ctx) else {
            return ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                format!(
                    "Could not resolve release id for {}",
                    self.spec.parameters["tag_name"]
                ),
            );
        };

        let bytes = match std::fs::read(&asset_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return ActionResult::failed(
                    &self.spec.id,
                    &self.spec.action_type,
                    format!("failed to read asset '{asset_path}': {e}"),
                )
            }
        };

        match client
            .upload_release_asset(&target, release_id, &asset_name, bytes)
            .await
        {
            Ok(asset) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({
                    "asset_id": asset["id"],
                    "asset_name": asset_name,
                    "release_id": release_id,
                }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}
