//! Wiki push action

use super::{push_url, run_git};
use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::ActionResult;
use forgeshift_client::GitHubClient;
use serde_json::json;
use std::path::Path;

/// `wiki_push` — push the exported wiki repository to the destination
/// wiki. Pushed history is irreversible.
pub struct PushWikiAction {
    spec: ActionSpec,
}

impl PushWikiAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for PushWikiAction {
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
        if !Path::new(&source_dir).exists() {
            return ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                format!("wiki repository directory not found: {source_dir}"),
            );
        }

        let url = push_url(&ctx.credentials.destination_token, &target, ".wiki");
        match run_git(&["push", "--mirror", &url], Path::new(&source_dir)).await {
            Ok(_) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "target_repo": target, "wiki_pushed": true }),
            )
            .irreversible(),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        }
    }
}
