//! Migration metadata preservation

use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::ActionResult;
use base64::Engine;
use forgeshift_client::GitHubClient;
use serde_json::json;

const DEFAULT_ARTIFACT_PATH: &str = ".migration/metadata.json";

/// `artifact_commit` — commit migration metadata (original ids, URLs,
/// unmapped users, gaps) into the destination repository so the
/// provenance survives the move.
pub struct CommitPreservationArtifactsAction {
    spec: ActionSpec,
}

impl CommitPreservationArtifactsAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CommitPreservationArtifactsAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let metadata = &self.spec.parameters["metadata"];
        if metadata.is_null() {
            return ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                "missing required parameter: metadata",
            );
        }
        let path = self
            .spec
            .param_str("artifact_path")
            .unwrap_or(DEFAULT_ARTIFACT_PATH);

        let body = match serde_json::to_string_pretty(metadata) {
            Ok(body) => body,
            Err(e) => {
                return ActionResult::failed(
                    &self.spec.id,
                    &self.spec.action_type,
                    format!("metadata is not serializable: {e}"),
                )
            }
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(body.as_bytes());

        match client
            .put_contents(
                &target,
                path,
                "Preserve migration metadata",
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
                    "artifact_path": path,
                    "commit_sha": result["commit"]["sha"],
                }),
            ),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}
