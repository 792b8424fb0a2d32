//! Package publication action

use super::manual_follow_up;
use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::ActionResult;
use forgeshift_client::GitHubClient;

/// `package_publish` — package binaries are not migrated
/// automatically; each registry format needs its own publish flow.
pub struct PublishPackageAction {
    spec: ActionSpec,
}

impl PublishPackageAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for PublishPackageAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, _client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let name = self.spec.param_str("name").unwrap_or("?");
        let package_type = self.spec.param_str("package_type").unwrap_or("unknown");
        manual_follow_up(
            &self.spec,
            &format!(
                "Package '{name}' ({package_type}) must be republished manually to the destination registry"
            ),
        )
    }
}
