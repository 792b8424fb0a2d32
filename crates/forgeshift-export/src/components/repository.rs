//! Repository component: branches, tags, LFS patterns, submodules

use super::{
    collect_pages, fetch_file_content, record_step_error, save_json, ExportComponent,
    ExportContext,
};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::Result;
use serde_json::{json, Value};
use tracing::info;

pub struct RepositoryComponent;

#[async_trait::async_trait]
impl ExportComponent for RepositoryComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Repository
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting repository");
        let dir = ctx.component_dir(self.kind())?;

        let mut summary = json!({
            "project_id": ctx.project_id,
            "http_url": ctx.project["http_url_to_repo"],
            "ssh_url": ctx.project["ssh_url_to_repo"],
            "default_branch": ctx.project["default_branch"],
            "archived": ctx.project["archived"].as_bool().unwrap_or(false),
            "empty_repo": ctx.project["empty_repo"].as_bool().unwrap_or(false),
        });

        if summary["empty_repo"].as_bool() == Some(true) {
            info!("repository is empty, nothing to enumerate");
            summary["reason"] = json!("empty_repository");
            save_json(&dir.join("repository.json"), &summary)?;
            return Ok(ComponentReport::skipped(self.kind(), "empty_repository"));
        }

        match self.export_branches(ctx, &dir).await {
            Ok(branches) => summary["branches"] = branches,
            Err(e) => record_step_error(&mut summary, "branches", &e),
        }
        match self.export_tags(ctx, &dir).await {
            Ok(tags) => summary["tags"] = tags,
            Err(e) => record_step_error(&mut summary, "tags", &e),
        }
        match self.check_lfs(ctx).await {
            Ok(lfs) => summary["lfs"] = lfs,
            Err(e) => record_step_error(&mut summary, "lfs", &e),
        }
        match self.check_submodules(ctx).await {
            Ok(submodules) => summary["submodules"] = submodules,
            Err(e) => record_step_error(&mut summary, "submodules", &e),
        }

        save_json(&dir.join("repository.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

impl RepositoryComponent {
    async fn export_branches(
        &self,
        ctx: &ExportContext,
        dir: &std::path::Path,
    ) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/repository/branches", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut protected = 0u64;
        let branches: Vec<Value> = items
            .iter()
            .map(|branch| {
                if branch["protected"].as_bool().unwrap_or(false) {
                    protected += 1;
                }
                json!({
                    "name": branch["name"],
                    "protected": branch["protected"].as_bool().unwrap_or(false),
                    "merged": branch["merged"].as_bool().unwrap_or(false),
                    "default": branch["default"].as_bool().unwrap_or(false),
                    "commit_sha": branch["commit"]["id"],
                    "commit_message": branch["commit"]["message"],
                })
            })
            .collect();

        save_json(&dir.join("branches.json"), &Value::Array(branches))?;
        Ok(json!({
            "total": items.len(),
            "protected": protected,
            "file": "branches.json",
        }))
    }

    async fn export_tags(&self, ctx: &ExportContext, dir: &std::path::Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/repository/tags", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut protected = 0u64;
        let tags: Vec<Value> = items
            .iter()
            .map(|tag| {
                if tag["protected"].as_bool().unwrap_or(false) {
                    protected += 1;
                }
                json!({
                    "name": tag["name"],
                    "message": tag["message"],
                    "protected": tag["protected"].as_bool().unwrap_or(false),
                    "commit_sha": tag["commit"]["id"],
                    "commit_message": tag["commit"]["message"],
                    "release": !tag["release"].is_null(),
                })
            })
            .collect();

        save_json(&dir.join("tags.json"), &Value::Array(tags))?;
        Ok(json!({
            "total": items.len(),
            "protected": protected,
            "file": "tags.json",
        }))
    }

    async fn check_lfs(&self, ctx: &ExportContext) -> Result<Value> {
        let content = fetch_file_content(&ctx.client, ctx.project_id, ".gitattributes").await?;

        let mut enabled = false;
        let mut patterns: Vec<String> = Vec::new();
        if let Some(content) = content {
            for line in content.lines() {
                if line.contains("filter=lfs") {
                    enabled = true;
                    patterns.push(line.trim().to_string());
                }
            }
        }

        Ok(json!({
            "enabled": enabled,
            "patterns": patterns,
            "note": if enabled { json!("LFS objects must be fetched separately") } else { Value::Null },
        }))
    }

    async fn check_submodules(&self, ctx: &ExportContext) -> Result<Value> {
        let content = fetch_file_content(&ctx.client, ctx.project_id, ".gitmodules").await?;

        let Some(content) = content else {
            return Ok(json!({
                "has_submodules": false,
                "count": 0,
                "submodules": [],
            }));
        };

        let mut submodules: Vec<Value> = Vec::new();
        let mut current = serde_json::Map::new();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with("[submodule") {
                if !current.is_empty() {
                    submodules.push(Value::Object(std::mem::take(&mut current)));
                }
            } else if let Some((key, value)) = line.split_once('=') {
                current.insert(key.trim().to_string(), json!(value.trim()));
            }
        }
        if !current.is_empty() {
            submodules.push(Value::Object(current));
        }

        Ok(json!({
            "has_submodules": true,
            "count": submodules.len(),
            "submodules": submodules,
        }))
    }
}
