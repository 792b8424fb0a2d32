//! Issue machinery actions

use super::{manual_follow_up, with_attribution};
use crate::action::{Action, ActionSpec};
use crate::context::ApplyContext;
use crate::result::{ActionResult, SimulationOutcome};
use forgeshift_client::GitHubClient;
use serde_json::json;

/// `label_create` — labels are a known-unsupported destination
/// capability in this implementation; succeeds with a follow-up note.
pub struct CreateLabelAction {
    spec: ActionSpec,
}

impl CreateLabelAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CreateLabelAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn simulate(&self, client: &GitHubClient, _ctx: &ApplyContext) -> ActionResult {
        let target = self.spec.param_str("target_repo").unwrap_or_default();
        let name = self.spec.param_str("name").unwrap_or_default();

        match client.get_label(target, name).await {
            Ok(response) if response.is_success() => ActionResult::simulated(
                &self.spec.id,
                &self.spec.action_type,
                SimulationOutcome::WouldSkip,
                format!("Label '{name}' already exists, would skip"),
                json!({ "label_name": name, "exists": true }),
            ),
            Ok(response) if response.status == 404 => ActionResult::simulated(
                &self.spec.id,
                &self.spec.action_type,
                SimulationOutcome::WouldCreate,
                format!("Would create label: '{name}'"),
                json!({ "label_name": name }),
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

    async fn execute(&self, _client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let name = self.spec.param_str("name").unwrap_or("?");
        manual_follow_up(
            &self.spec,
            &format!("Label '{name}' requires manual creation on the destination"),
        )
    }
}

/// `milestone_create` — same manual-follow-up contract as labels.
pub struct CreateMilestoneAction {
    spec: ActionSpec,
}

impl CreateMilestoneAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CreateMilestoneAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn simulate(&self, _client: &GitHubClient, _ctx: &ApplyContext) -> ActionResult {
        let title = self.spec.param_str("title").unwrap_or_default();
        ActionResult::simulated(
            &self.spec.id,
            &self.spec.action_type,
            SimulationOutcome::WouldCreate,
            format!("Would create milestone: '{title}'"),
            json!({ "milestone_title": title }),
        )
    }

    async fn execute(&self, _client: &GitHubClient, _ctx: &mut ApplyContext) -> ActionResult {
        let title = self.spec.param_str("title").unwrap_or("?");
        manual_follow_up(
            &self.spec,
            &format!("Milestone '{title}' requires manual creation on the destination"),
        )
    }
}

/// `issue_create` — create the destination issue and record the
/// source-issue-id to issue-number mapping for later comment actions.
pub struct CreateIssueAction {
    spec: ActionSpec,
}

impl CreateIssueAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Action for CreateIssueAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    async fn simulate(&self, _client: &GitHubClient, _ctx: &ApplyContext) -> ActionResult {
        let title = self.spec.param_str("title").unwrap_or_default();
        let target = self.spec.param_str("target_repo").unwrap_or_default();
        ActionResult::simulated(
            &self.spec.id,
            &self.spec.action_type,
            SimulationOutcome::WouldCreate,
            format!("Would create issue: '{title}' in {target}"),
            json!({ "title": title, "gitlab_issue_id": self.spec.parameters["gitlab_issue_id"] }),
        )
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

        let body = with_attribution(
            self.spec.param_str("body").unwrap_or_default(),
            self.spec.param_str("original_author"),
            "created",
        );
        let mut payload = json!({ "title": title, "body": body });
        if let Some(labels) = self.spec.parameters.get("labels").filter(|l| l.is_array()) {
            payload["labels"] = labels.clone();
        }
        if let Some(assignees) = self
            .spec
            .parameters
            .get("assignees")
            .filter(|a| a.is_array())
        {
            payload["assignees"] = assignees.clone();
        }
        if let Some(milestone) = self.spec.parameters.get("milestone").filter(|m| m.is_u64()) {
            payload["milestone"] = milestone.clone();
        }

        match client.create_issue(&target, &payload).await {
            Ok(issue) => {
                let number = issue["number"].clone();
                if let Some(source_id) = self.spec.parameters["gitlab_issue_id"]
                    .as_u64()
                    .map(|id| id.to_string())
                    .or_else(|| {
                        self.spec.parameters["gitlab_issue_id"]
                            .as_str()
                            .map(String::from)
                    })
                {
                    ctx.set_id_mapping("issue", &source_id, number.clone());
                }
                ActionResult::ok(
                    &self.spec.id,
                    &self.spec.action_type,
                    json!({
                        "issue_number": number,
                        "issue_url": issue["html_url"],
                        "gitlab_issue_id": self.spec.parameters["gitlab_issue_id"],
                    }),
                )
            }
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}

/// `issue_comment_add` — resolve the destination issue number through
/// the id mapping when the plan references a source issue id.
/// Comments cannot be rolled back.
pub struct AddIssueCommentAction {
    spec: ActionSpec,
}

impl AddIssueCommentAction {
    pub fn new(spec: ActionSpec) -> Self {
        Self { spec }
    }

    fn resolve_issue_number(&self, ctx: &ApplyContext) -> Option<u64> {
        if let Some(number) = self.spec.parameters["issue_number"].as_u64() {
            return Some(number);
        }
        let source_id = self.spec.parameters["gitlab_issue_id"]
            .as_u64()
            .map(|id| id.to_string())
            .or_else(|| {
                self.spec.parameters["gitlab_issue_id"]
                    .as_str()
                    .map(String::from)
            })?;
        ctx.id_mapping("issue", &source_id)?.as_u64()
    }
}

#[async_trait::async_trait]
impl Action for AddIssueCommentAction {
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

        let Some(issue_number) = self.resolve_issue_number(ctx) else {
            return ActionResult::failed(
                &self.spec.id,
                &self.spec.action_type,
                format!(
                    "Could not resolve issue number for source issue {}",
                    self.spec.parameters["gitlab_issue_id"]
                ),
            );
        };

        let body = with_attribution(&body, self.spec.param_str("original_author"), "posted");
        match client
            .create_issue_comment(&target, issue_number, &body)
            .await
        {
            Ok(comment) => ActionResult::ok(
                &self.spec.id,
                &self.spec.action_type,
                json!({
                    "comment_id": comment["id"],
                    "issue_number": issue_number,
                }),
            )
            .irreversible(),
            Err(e) => ActionResult::failed(&self.spec.id, &self.spec.action_type, e.to_string()),
        }
    }
}
