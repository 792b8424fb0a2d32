//! Issues component: labels, milestones, issues with notes and
//! attachment references

use super::{collect_pages, extract_user, record_step_error, save_json, ExportComponent, ExportContext};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::Result;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

pub struct IssuesComponent;

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!?\[[^\]]*\]\(([^)]+)\)").expect("valid regex"))
}

/// Attachment references in markdown: relative upload paths only,
/// recorded but not downloaded.
pub fn extract_attachment_refs(content: &str) -> Vec<Value> {
    let mut seen = std::collections::BTreeSet::new();
    for captures in markdown_link().captures_iter(content) {
        let url = captures[1].to_string();
        if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
            continue;
        }
        seen.insert(url);
    }
    seen.into_iter()
        .map(|url| json!({ "url": url, "note": "Attachment reference recorded, not downloaded" }))
        .collect()
}

#[async_trait::async_trait]
impl ExportComponent for IssuesComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Issues
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting issues");
        let dir = ctx.component_dir(self.kind())?;
        let mut summary = json!({ "project_id": ctx.project_id });

        match self.export_labels(ctx, &dir).await {
            Ok(labels) => summary["labels"] = labels,
            Err(e) => record_step_error(&mut summary, "labels", &e),
        }
        match self.export_milestones(ctx, &dir).await {
            Ok(milestones) => summary["milestones"] = milestones,
            Err(e) => record_step_error(&mut summary, "milestones", &e),
        }
        match self.export_issues(ctx, &dir).await {
            Ok(issues) => summary["issues"] = issues,
            Err(e) => record_step_error(&mut summary, "issues", &e),
        }

        save_json(&dir.join("issues_metadata.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

impl IssuesComponent {
    async fn export_labels(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/labels", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let labels: Vec<Value> = items
            .iter()
            .map(|label| {
                json!({
                    "id": label["id"],
                    "name": label["name"],
                    "description": label["description"],
                    "color": label["color"],
                    "text_color": label["text_color"],
                    "open_issues_count": label["open_issues_count"].as_u64().unwrap_or(0),
                    "closed_issues_count": label["closed_issues_count"].as_u64().unwrap_or(0),
                    "open_merge_requests_count": label["open_merge_requests_count"].as_u64().unwrap_or(0),
                })
            })
            .collect();

        save_json(&dir.join("labels.json"), &Value::Array(labels))?;
        Ok(json!({ "total": items.len(), "file": "labels.json" }))
    }

    async fn export_milestones(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/milestones", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut active = 0u64;
        let milestones: Vec<Value> = items
            .iter()
            .map(|milestone| {
                if milestone["state"].as_str() == Some("active") {
                    active += 1;
                }
                json!({
                    "id": milestone["id"],
                    "iid": milestone["iid"],
                    "title": milestone["title"],
                    "description": milestone["description"],
                    "state": milestone["state"],
                    "due_date": milestone["due_date"],
                    "start_date": milestone["start_date"],
                    "created_at": milestone["created_at"],
                    "updated_at": milestone["updated_at"],
                })
            })
            .collect();

        save_json(&dir.join("milestones.json"), &Value::Array(milestones))?;
        Ok(json!({
            "total": items.len(),
            "active": active,
            "file": "milestones.json",
        }))
    }

    async fn export_issues(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/issues", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut state_counts: Map<String, Value> = Map::new();
        let mut issues: Vec<Value> = Vec::new();

        for (index, issue) in items.iter().enumerate() {
            let state = issue["state"].as_str().unwrap_or("unknown").to_string();
            let count = state_counts.get(&state).and_then(Value::as_u64).unwrap_or(0);
            state_counts.insert(state.clone(), json!(count + 1));

            let issue_iid = issue["iid"].as_u64().unwrap_or_default();
            let description = issue["description"].as_str().unwrap_or_default();

            let mut record = json!({
                "id": issue["id"],
                "iid": issue_iid,
                "title": issue["title"],
                "description": issue["description"],
                "state": state,
                "created_at": issue["created_at"],
                "updated_at": issue["updated_at"],
                "closed_at": issue["closed_at"],
                "closed_by": extract_user(&issue["closed_by"]),
                "author": extract_user(&issue["author"]),
                "assignees": issue["assignees"].as_array().map(|users| {
                    users.iter().map(extract_user).collect::<Vec<_>>()
                }).unwrap_or_default(),
                "labels": issue["labels"],
                "milestone": issue["milestone"]["title"],
                "web_url": issue["web_url"],
                "upvotes": issue["upvotes"].as_u64().unwrap_or(0),
                "downvotes": issue["downvotes"].as_u64().unwrap_or(0),
                "user_notes_count": issue["user_notes_count"].as_u64().unwrap_or(0),
                "confidential": issue["confidential"].as_bool().unwrap_or(false),
                "discussion_locked": issue["discussion_locked"].as_bool().unwrap_or(false),
                "due_date": issue["due_date"],
                "time_stats": issue["time_stats"],
                "attachments": extract_attachment_refs(description),
            });

            match self.export_issue_notes(ctx, issue_iid).await {
                Ok(comments) => record["comments"] = comments,
                Err(e) => {
                    record["comments_error"] =
                        json!(forgeshift_core::redact_secrets(&e.to_string()));
                }
            }

            issues.push(record);
            if (index + 1) % 50 == 0 {
                info!(exported = index + 1, "issue export progress");
            }
        }

        save_json(&dir.join("issues.json"), &Value::Array(issues))?;
        Ok(json!({
            "total": items.len(),
            "state_counts": state_counts,
            "file": "issues.json",
        }))
    }

    /// Non-system notes only; system notes are forge-generated noise.
    async fn export_issue_notes(&self, ctx: &ExportContext, issue_iid: u64) -> Result<Value> {
        let params = vec![("sort".to_string(), "asc".to_string())];
        let items = collect_pages(
            &ctx.client,
            &format!(
                "/api/v4/projects/{}/issues/{issue_iid}/notes",
                ctx.project_id
            ),
            &params,
            None,
        )
        .await?;

        let notes: Vec<Value> = items
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
                })
            })
            .collect();

        Ok(Value::Array(notes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_refs_keep_relative_paths_only() {
        let markdown = "See ![shot](/uploads/abc/shot.png) and \
                        [doc](https://example.com/doc.pdf) and \
                        [log](/uploads/def/log.txt)";
        let refs = extract_attachment_refs(markdown);
        let urls: Vec<&str> = refs.iter().filter_map(|r| r["url"].as_str()).collect();
        assert_eq!(urls, vec!["/uploads/abc/shot.png", "/uploads/def/log.txt"]);
    }

    #[test]
    fn no_attachments_in_plain_text() {
        assert!(extract_attachment_refs("just words").is_empty());
    }
}
