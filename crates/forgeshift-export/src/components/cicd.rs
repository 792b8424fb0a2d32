//! CI/CD component: config file, variables metadata, environments,
//! schedules, recent pipelines

use super::{
    collect_pages, fetch_file_content, record_step_error, save_json, ExportComponent,
    ExportContext,
};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::Result;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

const MAX_PIPELINES: usize = 100;

pub struct CiCdComponent;

#[async_trait::async_trait]
impl ExportComponent for CiCdComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::CiCd
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting CI/CD");
        let dir = ctx.component_dir(self.kind())?;
        let mut summary = json!({ "project_id": ctx.project_id });

        match self.export_ci_config(ctx, &dir).await {
            Ok(config) => summary["ci_config"] = config,
            Err(e) => record_step_error(&mut summary, "ci_config", &e),
        }
        match self.export_variables(ctx, &dir).await {
            Ok(variables) => summary["variables"] = variables,
            Err(e) => record_step_error(&mut summary, "variables", &e),
        }
        match self.export_environments(ctx, &dir).await {
            Ok(environments) => summary["environments"] = environments,
            Err(e) => record_step_error(&mut summary, "environments", &e),
        }
        match self.export_schedules(ctx, &dir).await {
            Ok(schedules) => summary["schedules"] = schedules,
            Err(e) => record_step_error(&mut summary, "schedules", &e),
        }
        match self.export_pipelines(ctx, &dir).await {
            Ok(pipelines) => summary["pipelines"] = pipelines,
            Err(e) => record_step_error(&mut summary, "pipelines", &e),
        }

        save_json(&dir.join("cicd.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

impl CiCdComponent {
    async fn export_ci_config(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let content = fetch_file_content(&ctx.client, ctx.project_id, ".gitlab-ci.yml").await?;

        let Some(content) = content else {
            info!("no CI configuration file found");
            return Ok(json!({ "found": false, "reason": "file_not_found" }));
        };

        std::fs::write(dir.join(".gitlab-ci.yml"), &content)?;

        let includes: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("include:") || line.contains("include:"))
            .collect();

        Ok(json!({
            "found": true,
            "file": ".gitlab-ci.yml",
            "size_bytes": content.len(),
            "has_includes": !includes.is_empty(),
            "include_lines": includes,
        }))
    }

    /// Variable metadata only. Values are secrets and never leave the
    /// source forge.
    async fn export_variables(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/variables", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut protected = 0u64;
        let mut masked = 0u64;
        let variables: Vec<Value> = items
            .iter()
            .map(|var| {
                if var["protected"].as_bool().unwrap_or(false) {
                    protected += 1;
                }
                if var["masked"].as_bool().unwrap_or(false) {
                    masked += 1;
                }
                json!({
                    "key": var["key"],
                    "variable_type": var["variable_type"].as_str().unwrap_or("env_var"),
                    "protected": var["protected"].as_bool().unwrap_or(false),
                    "masked": var["masked"].as_bool().unwrap_or(false),
                    "environment_scope": var["environment_scope"].as_str().unwrap_or("*"),
                    "note": "Value not exported for security",
                })
            })
            .collect();

        save_json(&dir.join("variables.json"), &Value::Array(variables))?;
        Ok(json!({
            "total": items.len(),
            "protected": protected,
            "masked": masked,
            "file": "variables.json",
        }))
    }

    async fn export_environments(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/environments", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let environments: Vec<Value> = items
            .iter()
            .map(|env| {
                json!({
                    "id": env["id"],
                    "name": env["name"],
                    "state": env["state"],
                    "external_url": env["external_url"],
                    "created_at": env["created_at"],
                    "updated_at": env["updated_at"],
                })
            })
            .collect();

        save_json(&dir.join("environments.json"), &Value::Array(environments))?;
        Ok(json!({ "total": items.len(), "file": "environments.json" }))
    }

    async fn export_schedules(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/pipeline_schedules", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut active = 0u64;
        let schedules: Vec<Value> = items
            .iter()
            .map(|schedule| {
                if schedule["active"].as_bool().unwrap_or(false) {
                    active += 1;
                }
                json!({
                    "id": schedule["id"],
                    "description": schedule["description"],
                    "ref": schedule["ref"],
                    "cron": schedule["cron"],
                    "cron_timezone": schedule["cron_timezone"],
                    "active": schedule["active"].as_bool().unwrap_or(false),
                    "created_at": schedule["created_at"],
                    "updated_at": schedule["updated_at"],
                    "owner": {
                        "username": schedule["owner"]["username"],
                        "name": schedule["owner"]["name"],
                    },
                })
            })
            .collect();

        save_json(&dir.join("schedules.json"), &Value::Array(schedules))?;
        Ok(json!({
            "total": items.len(),
            "active": active,
            "file": "schedules.json",
        }))
    }

    async fn export_pipelines(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let params = vec![
            ("order_by".to_string(), "id".to_string()),
            ("sort".to_string(), "desc".to_string()),
        ];
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/pipelines", ctx.project_id),
            &params,
            Some(MAX_PIPELINES),
        )
        .await?;

        let mut status_counts: Map<String, Value> = Map::new();
        let pipelines: Vec<Value> = items
            .iter()
            .map(|pipeline| {
                let status = pipeline["status"].as_str().unwrap_or("unknown").to_string();
                let count = status_counts
                    .get(&status)
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                status_counts.insert(status.clone(), json!(count + 1));
                json!({
                    "id": pipeline["id"],
                    "iid": pipeline["iid"],
                    "ref": pipeline["ref"],
                    "sha": pipeline["sha"],
                    "status": status,
                    "source": pipeline["source"],
                    "created_at": pipeline["created_at"],
                    "updated_at": pipeline["updated_at"],
                    "web_url": pipeline["web_url"],
                })
            })
            .collect();

        save_json(&dir.join("pipelines.json"), &Value::Array(pipelines))?;
        Ok(json!({
            "total": items.len(),
            "status_counts": status_counts,
            "file": "pipelines.json",
            "note": format!("Limited to {MAX_PIPELINES} most recent pipelines"),
        }))
    }
}
