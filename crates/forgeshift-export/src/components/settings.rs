//! Settings component: project settings, protections, members,
//! webhooks, deploy keys and tokens

use super::{collect_pages, record_step_error, save_json, ExportComponent, ExportContext};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::Result;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

pub struct SettingsComponent;

fn access_level_label(level: u64) -> String {
    match level {
        10 => "Guest".to_string(),
        20 => "Reporter".to_string(),
        30 => "Developer".to_string(),
        40 => "Maintainer".to_string(),
        50 => "Owner".to_string(),
        other => format!("Level_{other}"),
    }
}

#[async_trait::async_trait]
impl ExportComponent for SettingsComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Settings
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting settings");
        let dir = ctx.component_dir(self.kind())?;
        let mut summary = json!({ "project_id": ctx.project_id });

        let project_settings = project_settings(&ctx.project);
        save_json(&dir.join("project_settings.json"), &project_settings)?;
        summary["project_settings"] = project_settings;

        match self.export_branch_protections(ctx, &dir).await {
            Ok(result) => summary["branch_protections"] = result,
            Err(e) => record_step_error(&mut summary, "branch_protections", &e),
        }
        match self.export_tag_protections(ctx, &dir).await {
            Ok(result) => summary["tag_protections"] = result,
            Err(e) => record_step_error(&mut summary, "tag_protections", &e),
        }
        match self.export_members(ctx, &dir).await {
            Ok(result) => summary["members"] = result,
            Err(e) => record_step_error(&mut summary, "members", &e),
        }
        match self.export_webhooks(ctx, &dir).await {
            Ok(result) => summary["webhooks"] = result,
            Err(e) => record_step_error(&mut summary, "webhooks", &e),
        }
        match self.export_deploy_keys(ctx, &dir).await {
            Ok(result) => summary["deploy_keys"] = result,
            Err(e) => record_step_error(&mut summary, "deploy_keys", &e),
        }
        match self.export_deploy_tokens(ctx, &dir).await {
            Ok(result) => summary["deploy_tokens"] = result,
            Err(e) => record_step_error(&mut summary, "deploy_tokens", &e),
        }

        save_json(&dir.join("settings_metadata.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

/// Core project settings carried over from the project payload.
fn project_settings(project: &Value) -> Value {
    json!({
        "name": project["name"],
        "path": project["path"],
        "description": project["description"],
        "visibility": project["visibility"],
        "default_branch": project["default_branch"],
        "topics": project["topics"],
        "archived": project["archived"].as_bool().unwrap_or(false),
        "issues_enabled": project["issues_enabled"].as_bool().unwrap_or(true),
        "merge_requests_enabled": project["merge_requests_enabled"].as_bool().unwrap_or(true),
        "wiki_enabled": project["wiki_enabled"].as_bool().unwrap_or(true),
        "snippets_enabled": project["snippets_enabled"].as_bool().unwrap_or(true),
        "container_registry_enabled": project["container_registry_enabled"].as_bool().unwrap_or(false),
        "packages_enabled": project["packages_enabled"].as_bool().unwrap_or(false),
        "only_allow_merge_if_pipeline_succeeds": project["only_allow_merge_if_pipeline_succeeds"].as_bool().unwrap_or(false),
        "only_allow_merge_if_all_discussions_are_resolved": project["only_allow_merge_if_all_discussions_are_resolved"].as_bool().unwrap_or(false),
        "autoclose_referenced_issues": project["autoclose_referenced_issues"].as_bool().unwrap_or(true),
        "remove_source_branch_after_merge": project["remove_source_branch_after_merge"].as_bool().unwrap_or(false),
        "merge_method": project["merge_method"].as_str().unwrap_or("merge"),
        "squash_option": project["squash_option"].as_str().unwrap_or("default_off"),
        "ci_config_path": project["ci_config_path"],
        "build_timeout": project["build_timeout"].as_u64().unwrap_or(3600),
    })
}

impl SettingsComponent {
    async fn export_branch_protections(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/protected_branches", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let access_entries = |levels: &Value| -> Vec<Value> {
            levels
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| {
                            json!({
                                "access_level": entry["access_level"],
                                "access_level_description": entry["access_level_description"],
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let protections: Vec<Value> = items
            .iter()
            .map(|protection| {
                json!({
                    "name": protection["name"],
                    "push_access_levels": access_entries(&protection["push_access_levels"]),
                    "merge_access_levels": access_entries(&protection["merge_access_levels"]),
                    "allow_force_push": protection["allow_force_push"].as_bool().unwrap_or(false),
                    "code_owner_approval_required": protection["code_owner_approval_required"].as_bool().unwrap_or(false),
                })
            })
            .collect();

        save_json(&dir.join("protected_branches.json"), &Value::Array(protections))?;
        Ok(json!({ "total": items.len(), "file": "protected_branches.json" }))
    }

    async fn export_tag_protections(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/protected_tags", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let protections: Vec<Value> = items
            .iter()
            .map(|protection| {
                let create_levels: Vec<Value> = protection["create_access_levels"]
                    .as_array()
                    .map(|entries| {
                        entries
                            .iter()
                            .map(|entry| {
                                json!({
                                    "access_level": entry["access_level"],
                                    "access_level_description": entry["access_level_description"],
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                json!({
                    "name": protection["name"],
                    "create_access_levels": create_levels,
                })
            })
            .collect();

        save_json(&dir.join("protected_tags.json"), &Value::Array(protections))?;
        Ok(json!({ "total": items.len(), "file": "protected_tags.json" }))
    }

    async fn export_members(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/members/all", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut by_level: Map<String, Value> = Map::new();
        let members: Vec<Value> = items
            .iter()
            .map(|member| {
                let level = member["access_level"].as_u64().unwrap_or(0);
                let label = access_level_label(level);
                let count = by_level.get(&label).and_then(Value::as_u64).unwrap_or(0);
                by_level.insert(label, json!(count + 1));
                json!({
                    "id": member["id"],
                    "username": member["username"],
                    "name": member["name"],
                    "access_level": level,
                    "expires_at": member["expires_at"],
                })
            })
            .collect();

        save_json(&dir.join("members.json"), &Value::Array(members))?;
        Ok(json!({
            "total": items.len(),
            "access_levels": by_level,
            "file": "members.json",
        }))
    }

    /// Webhook metadata only; tokens never leave the source forge.
    async fn export_webhooks(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/hooks", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let webhooks: Vec<Value> = items
            .iter()
            .map(|hook| {
                json!({
                    "id": hook["id"],
                    "url": hook["url"],
                    "push_events": hook["push_events"].as_bool().unwrap_or(false),
                    "issues_events": hook["issues_events"].as_bool().unwrap_or(false),
                    "merge_requests_events": hook["merge_requests_events"].as_bool().unwrap_or(false),
                    "wiki_page_events": hook["wiki_page_events"].as_bool().unwrap_or(false),
                    "tag_push_events": hook["tag_push_events"].as_bool().unwrap_or(false),
                    "note_events": hook["note_events"].as_bool().unwrap_or(false),
                    "job_events": hook["job_events"].as_bool().unwrap_or(false),
                    "pipeline_events": hook["pipeline_events"].as_bool().unwrap_or(false),
                    "deployment_events": hook["deployment_events"].as_bool().unwrap_or(false),
                    "releases_events": hook["releases_events"].as_bool().unwrap_or(false),
                    "enable_ssl_verification": hook["enable_ssl_verification"].as_bool().unwrap_or(true),
                    "created_at": hook["created_at"],
                    "note": "Token/secret not exported for security",
                })
            })
            .collect();

        save_json(&dir.join("webhooks.json"), &Value::Array(webhooks))?;
        Ok(json!({ "total": items.len(), "file": "webhooks.json" }))
    }

    async fn export_deploy_keys(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/deploy_keys", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let keys: Vec<Value> = items
            .iter()
            .map(|key| {
                json!({
                    "id": key["id"],
                    "title": key["title"],
                    "key": key["key"],
                    "can_push": key["can_push"].as_bool().unwrap_or(false),
                    "created_at": key["created_at"],
                })
            })
            .collect();

        save_json(&dir.join("deploy_keys.json"), &Value::Array(keys))?;
        Ok(json!({ "total": items.len(), "file": "deploy_keys.json" }))
    }

    async fn export_deploy_tokens(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let response = ctx
            .client
            .get(
                &format!("/api/v4/projects/{}/deploy_tokens", ctx.project_id),
                &[],
            )
            .await?;

        if response.status != 200 {
            return Ok(json!({
                "total": 0,
                "note": "Deploy tokens API not accessible or not available",
            }));
        }

        let tokens: Vec<Value> = response
            .body
            .as_array()
            .map(|tokens| {
                tokens
                    .iter()
                    .map(|token| {
                        json!({
                            "id": token["id"],
                            "name": token["name"],
                            "username": token["username"],
                            "expires_at": token["expires_at"],
                            "scopes": token["scopes"],
                            "revoked": token["revoked"].as_bool().unwrap_or(false),
                            "note": "Token value not exported for security",
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        save_json(&dir.join("deploy_tokens.json"), &Value::Array(tokens.clone()))?;
        Ok(json!({ "total": tokens.len(), "file": "deploy_tokens.json" }))
    }
}
