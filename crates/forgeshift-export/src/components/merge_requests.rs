//! Merge requests component: full records, discussions, approvals,
//! diff statistics

use super::{collect_pages, extract_user, record_step_error, save_json, ExportComponent, ExportContext};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::Result;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

pub struct MergeRequestsComponent;

/// Diff statistics by line-prefix scanning: `+`/`-` lines excluding
/// the `+++`/`---` headers. Binary payloads count as changed files
/// without addition/deletion tallies.
pub fn diff_stats(changes: &[Value]) -> Value {
    let mut additions = 0u64;
    let mut deletions = 0u64;

    for change in changes {
        let diff = change["diff"].as_str().unwrap_or_default();
        if diff.is_empty() || diff.contains("Binary files") {
            continue;
        }
        for line in diff.lines() {
            if line.starts_with('+') && !line.starts_with("+++") {
                additions += 1;
            } else if line.starts_with('-') && !line.starts_with("---") {
                deletions += 1;
            }
        }
    }

    json!({
        "available": true,
        "files_changed": changes.len(),
        "additions": additions,
        "deletions": deletions,
    })
}

#[async_trait::async_trait]
impl ExportComponent for MergeRequestsComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::MergeRequests
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting merge requests");
        let dir = ctx.component_dir(self.kind())?;
        let mut summary = json!({ "project_id": ctx.project_id });

        match self.export_merge_requests(ctx, &dir).await {
            Ok(result) => summary["merge_requests"] = result,
            Err(e) => record_step_error(&mut summary, "merge_requests", &e),
        }

        save_json(&dir.join("merge_requests_metadata.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

impl MergeRequestsComponent {
    async fn export_merge_requests(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/merge_requests", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut state_counts: Map<String, Value> = Map::new();
        let mut records: Vec<Value> = Vec::new();

        for (index, mr) in items.iter().enumerate() {
            let state = mr["state"].as_str().unwrap_or("unknown").to_string();
            let count = state_counts.get(&state).and_then(Value::as_u64).unwrap_or(0);
            state_counts.insert(state.clone(), json!(count + 1));

            let mr_iid = mr["iid"].as_u64().unwrap_or_default();
            let mut record = json!({
                "id": mr["id"],
                "iid": mr_iid,
                "title": mr["title"],
                "description": mr["description"],
                "state": state,
                "merged_at": mr["merged_at"],
                "closed_at": mr["closed_at"],
                "created_at": mr["created_at"],
                "updated_at": mr["updated_at"],
                "target_branch": mr["target_branch"],
                "source_branch": mr["source_branch"],
                "author": extract_user(&mr["author"]),
                "assignees": mr["assignees"].as_array().map(|users| {
                    users.iter().map(extract_user).collect::<Vec<_>>()
                }).unwrap_or_default(),
                "reviewers": mr["reviewers"].as_array().map(|users| {
                    users.iter().map(extract_user).collect::<Vec<_>>()
                }).unwrap_or_default(),
                "labels": mr["labels"],
                "milestone": mr["milestone"]["title"],
                "web_url": mr["web_url"],
                "merge_status": mr["merge_status"],
                "draft": mr["draft"].as_bool().unwrap_or(false),
                "work_in_progress": mr["work_in_progress"].as_bool().unwrap_or(false),
                "has_conflicts": mr["has_conflicts"].as_bool().unwrap_or(false),
                "sha": mr["sha"],
                "merge_commit_sha": mr["merge_commit_sha"],
                "squash": mr["squash"].as_bool().unwrap_or(false),
                "squash_commit_sha": mr["squash_commit_sha"],
                "user_notes_count": mr["user_notes_count"].as_u64().unwrap_or(0),
                "should_remove_source_branch": mr["should_remove_source_branch"],
            });

            match self.export_discussions(ctx, mr_iid).await {
                Ok(discussions) => record["discussions"] = discussions,
                Err(e) => {
                    record["discussions_error"] =
                        json!(forgeshift_core::redact_secrets(&e.to_string()));
                }
            }
            match self.export_approvals(ctx, mr_iid).await {
                Ok(approvals) => record["approvals"] = approvals,
                Err(e) => {
                    record["approvals_error"] =
                        json!(forgeshift_core::redact_secrets(&e.to_string()));
                }
            }
            match self.export_diff_stats(ctx, mr_iid).await {
                Ok(stats) => record["diff_stats"] = stats,
                Err(e) => {
                    record["diff_stats_error"] =
                        json!(forgeshift_core::redact_secrets(&e.to_string()));
                }
            }

            records.push(record);
            if (index + 1) % 20 == 0 {
                info!(exported = index + 1, "merge request export progress");
            }
        }

        save_json(&dir.join("merge_requests.json"), &Value::Array(records))?;
        Ok(json!({
            "total": items.len(),
            "state_counts": state_counts,
            "file": "merge_requests.json",
        }))
    }

    /// Discussions with non-system notes, `position` retained for diff
    /// comments. Empty discussions are dropped.
    async fn export_discussions(&self, ctx: &ExportContext, mr_iid: u64) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!(
                "/api/v4/projects/{}/merge_requests/{mr_iid}/discussions",
                ctx.project_id
            ),
            &[],
            None,
        )
        .await?;

        let mut discussions: Vec<Value> = Vec::new();
        for discussion in items {
            let notes: Vec<Value> = discussion["notes"]
                .as_array()
                .map(|notes| {
                    notes
                        .iter()
                        .filter(|note| !note["system"].as_bool().unwrap_or(false))
                        .map(|note| {
                            json!({
                                "id": note["id"],
                                "body": note["body"],
                                "author": extract_user(&note["author"]),
                                "created_at": note["created_at"],
                                "updated_at": note["updated_at"],
                                "resolvable": note["resolvable"].as_bool().unwrap_or(false),
                                "resolved": note["resolved"].as_bool().unwrap_or(false),
                                "position": note["position"],
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            if !notes.is_empty() {
                discussions.push(json!({
                    "id": discussion["id"],
                    "individual_note": discussion["individual_note"].as_bool().unwrap_or(false),
                    "notes": notes,
                }));
            }
        }

        Ok(Value::Array(discussions))
    }

    async fn export_approvals(&self, ctx: &ExportContext, mr_iid: u64) -> Result<Value> {
        let response = ctx
            .client
            .get(
                &format!(
                    "/api/v4/projects/{}/merge_requests/{mr_iid}/approvals",
                    ctx.project_id
                ),
                &[],
            )
            .await?;

        if response.status != 200 || !response.body.is_object() {
            return Ok(json!({
                "available": false,
                "note": "Approvals API not available or accessible",
            }));
        }

        let approved_by: Vec<Value> = response.body["approved_by"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| !entry["user"].is_null())
                    .map(|entry| extract_user(&entry["user"]))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "available": true,
            "approved": response.body["approved"].as_bool().unwrap_or(false),
            "approvals_required": response.body["approvals_required"].as_u64().unwrap_or(0),
            "approvals_left": response.body["approvals_left"].as_u64().unwrap_or(0),
            "approved_by": approved_by,
        }))
    }

    async fn export_diff_stats(&self, ctx: &ExportContext, mr_iid: u64) -> Result<Value> {
        let response = ctx
            .client
            .get(
                &format!(
                    "/api/v4/projects/{}/merge_requests/{mr_iid}/changes",
                    ctx.project_id
                ),
                &[],
            )
            .await?;

        if response.status != 200 || !response.body.is_object() {
            return Ok(json!({ "available": false }));
        }

        let changes = response.body["changes"].as_array().cloned().unwrap_or_default();
        Ok(diff_stats(&changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_prefix_lines_but_not_headers() {
        let changes = vec![json!({
            "diff": "--- a/src/main.rs\n+++ b/src/main.rs\n+fn new() {}\n+fn two() {}\n-fn old() {}\n context\n"
        })];
        let stats = diff_stats(&changes);
        assert_eq!(stats["files_changed"], 1);
        assert_eq!(stats["additions"], 2);
        assert_eq!(stats["deletions"], 1);
    }

    #[test]
    fn binary_diffs_count_the_file_only() {
        let changes = vec![
            json!({"diff": "Binary files a/logo.png and b/logo.png differ\n"}),
            json!({"diff": "+one line\n"}),
        ];
        let stats = diff_stats(&changes);
        assert_eq!(stats["files_changed"], 2);
        assert_eq!(stats["additions"], 1);
        assert_eq!(stats["deletions"], 0);
    }
}
