//! Releases component: metadata, notes, links, sources, evidence

use super::{collect_pages, extract_user, record_step_error, save_json, ExportComponent, ExportContext};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::Result;
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

pub struct ReleasesComponent;

#[async_trait::async_trait]
impl ExportComponent for ReleasesComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Releases
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting releases");
        let dir = ctx.component_dir(self.kind())?;
        let mut summary = json!({ "project_id": ctx.project_id });

        match self.export_releases(ctx, &dir).await {
            Ok(releases) => summary["releases"] = releases,
            Err(e) => record_step_error(&mut summary, "releases", &e),
        }

        save_json(&dir.join("releases_metadata.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

impl ReleasesComponent {
    async fn export_releases(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/releases", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let releases: Vec<Value> = items
            .iter()
            .map(|release| {
                let links: Vec<Value> = release["assets"]["links"]
                    .as_array()
                    .map(|links| {
                        links
                            .iter()
                            .map(|link| {
                                json!({
                                    "id": link["id"],
                                    "name": link["name"],
                                    "url": link["url"],
                                    "external": link["external"].as_bool().unwrap_or(true),
                                    "link_type": link["link_type"],
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let sources: Vec<Value> = release["assets"]["sources"]
                    .as_array()
                    .map(|sources| {
                        sources
                            .iter()
                            .map(|source| {
                                json!({ "format": source["format"], "url": source["url"] })
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                let evidences: Vec<Value> = release["evidences"]
                    .as_array()
                    .map(|evidences| {
                        evidences
                            .iter()
                            .map(|evidence| {
                                json!({
                                    "sha": evidence["sha"],
                                    "filepath": evidence["filepath"],
                                    "collected_at": evidence["collected_at"],
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                json!({
                    "tag_name": release["tag_name"],
                    "name": release["name"],
                    "description": release["description"],
                    "created_at": release["created_at"],
                    "released_at": release["released_at"],
                    "author": extract_user(&release["author"]),
                    "commit": {
                        "id": release["commit"]["id"],
                        "message": release["commit"]["message"],
                    },
                    "upcoming_release": release["upcoming_release"].as_bool().unwrap_or(false),
                    "links": links,
                    "sources": sources,
                    "evidences": evidences,
                })
            })
            .collect();

        save_json(&dir.join("releases.json"), &Value::Array(releases))?;

        if items.is_empty() {
            Ok(json!({ "total": 0, "note": "No releases found" }))
        } else {
            Ok(json!({ "total": items.len(), "file": "releases.json" }))
        }
    }
}
