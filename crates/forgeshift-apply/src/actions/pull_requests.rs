//! Pull request actions

use super::with_attribution;
use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::ActionResult;
use forgeshift_client::GitHubClient;
use serde_json::json;

/// `pr_create` — create a pull request; when the head branch no
/// longer exists (historic merged/closed MRs), fall back to an issue
/// preserving the discussion.
pub struct CreatePullRequestAction {
    spec: ActionSpec,
}

impl CreatePullRequestAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CreatePullRequestAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn execute(&self, client: &GitHubClient, ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let title = match self.spec.require_str("title") {
            Ok(title) => title.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let head = self.spec.param_str("head").unwrap_or_default().to_string();
        let base = self.spec.param_str("base").unwrap_or("main").to_string();
        let body = with_attribution(
            self.spec.param_str("body").unwrap_or_default(),
            self.spec.param_str("original_author"),
            "opened",
        );
        let source_mr_id = self.spec.parameters["gitlab_mr_id"].clone();

        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base,
            "draft": self.spec.parameters["draft"].as_bool().unwrap_or(false),
        });

        let response = match client.create_pull(&target, &payload).await {
            Ok(response) => response,
            Err(e) => {
                return ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string())
            }
        };

        if response.is_success() {
            let number = response.body["number"].clone();
            if let Some(source_id) = source_mr_id.as_u64().map(|id| id.to_string()) {
                ctx.set_id_mapping("pull_request", &source_id, number.clone());
            }
            return ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({
                    "pr_number": number,
                    "pr_url": response.body["html_url"],
                    "gitlab_mr_id": source_mr_id,
                }),
            );
        }

        // 422 means the head branch is gone; preserve the record as an
        // issue instead.
        if response.status == 422 {
            let fallback_body = format!(
                "{body}\n\n---\n*Imported as an issue because branch `{head}` no longer exists.*"
            );
            let issue_payload = json!({
                "title": format!("[MR] {title}"),
                "body": fallback_body,
            });
            return match client.create_issue(&target, &issue_payload).await {
                Ok(issue) => {
                    let number = issue["number"].clone();
                    if let Some(source_id) = source_mr_id.as_u64().map(|id| id.to_string()) {
                        ctx.set_id_mapping("pull_request", &source_id, number.clone());
                    }
                    ActionResult::ok(
                        &self.spec.id,
                        &self.spec.action_type,
                        json!({
                            "fallback": "issue",
                            "issue_number": number,
                            "issue_url": issue["html_url"],
                            "gitlab_mr_id": source_mr_id,
                        }),
                    )
                }
                Err(e) => {
                    ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string())
                }
            };
        }

        ActionResult::failed(
            &self.spec.id,
            &self.spec.action_type,
            format!("pull request creation failed: HTTP {}", response.status),
        )
    }
}

/// `pr_comment_add` — comments are irreversible; the PR number is
/// resolved through the pull_request id mapping.
pub struct AddPrCommentAction {
    spec: ActionSpec,
}

impl AddPrCommentAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }

    fn resolve_pr_number(&self, ctx: &ApplyContext) -> Option<u64> {
        if let Some(number) = self.spec.parameters["pr_number"].as_u64() {
            return Some(number);
        }
        let source_id = self.spec.parameters["gitlab_mr_id"]
            .as_u64()
            .map(|id| id.to_string())?;
        ctx.id_mapping("pull_request", &source_id)?.as_u64()
    }
}

#[async_trait::async_trait]
impl Action for AddPrCommentAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn is_reversible(&self) -> bool {
        false
    }

    async fn execute(&self, client: &GitHubClient, ctx: &mut ApplyContext) -> ActionResult {
        let target = match self.spec.require_str("target_repo") {
            Ok(target) => target.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let body = match self.spec.require_str("body") {
            Ok(body) => body.to_string(),
            Err(e) => return ActionResult::failed(&self.spec.id, &self.spec.action_type, e),
        };
        let Some(pr_number) = self.resolve_pr_number(ctx) else {
            return ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                format!(
                    "Could not resolve pull request number for source merge request {}",
                    self.spec.parameters["gitlab_mr_id"]
                ),
            );
        };

        let body = with_attribution(&body, self.spec.param_str("original_author"), "posted");
        // Pull requests share the issue comment API.
        match client.create_issue_comment(&target, pr_number, &body).await {
            Ok(comment) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({ "comment_id": comment["id"], "pr_number": pr_number }),
            )
            .irreversible(),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}
