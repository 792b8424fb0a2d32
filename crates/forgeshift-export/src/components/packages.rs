//! Packages component: registry metadata and file descriptors
//!
//! Package binaries above the size ceiling are never downloaded; the
//! gap is reported so the operator can move them by hand.

use super::{collect_pages, record_step_error, save_json, ExportComponent, ExportContext};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::Result;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

/// Files above this size are reported as gaps instead of downloaded.
pub const MAX_PACKAGE_FILE_BYTES: u64 = 500 * 1024 * 1024;

pub struct PackagesComponent;

#[async_trait::async_trait]
impl ExportComponent for PackagesComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Packages
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting packages");
        let dir = ctx.component_dir(self.kind())?;
        let mut summary = json!({ "project_id": ctx.project_id });

        match self.export_packages(ctx, &dir).await {
            Ok(packages) => summary["packages"] = packages,
            Err(e) => record_step_error(&mut summary, "packages", &e),
        }

        save_json(&dir.join("packages_metadata.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

impl PackagesComponent {
    async fn export_packages(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/packages", ctx.project_id),
            &[],
            None,
        )
        .await?;

        let mut package_types: Map<String, Value> = Map::new();
        let mut oversized = 0u64;
        let mut packages: Vec<Value> = Vec::new();

        for package in &items {
            let package_id = package["id"].as_u64().unwrap_or_default();
            let package_type = package["package_type"].as_str().unwrap_or("unknown");
            let count = package_types
                .get(package_type)
                .and_then(Value::as_u64)
                .unwrap_or(0);
            package_types.insert(package_type.to_string(), json!(count + 1));

            let mut record = json!({
                "id": package_id,
                "name": package["name"],
                "version": package["version"],
                "package_type": package_type,
                "created_at": package["created_at"],
                "status": package["status"],
            });

            match self.package_details(ctx, package_id).await {
                Ok((details, skipped)) => {
                    oversized += skipped;
                    for (key, value) in details {
                        record[key] = value;
                    }
                }
                Err(e) => {
                    record["details_error"] =
                        json!(forgeshift_core::redact_secrets(&e.to_string()));
                }
            }

            packages.push(record);
        }

        save_json(&dir.join("packages.json"), &Value::Array(packages))?;

        if items.is_empty() {
            return Ok(json!({ "total": 0, "note": "No packages found" }));
        }
        Ok(json!({
            "total": items.len(),
            "package_types": package_types,
            "file": "packages.json",
            "download_gaps": oversized,
            "note": "Package binaries are not migrated automatically",
        }))
    }

    async fn package_details(
        &self,
        ctx: &ExportContext,
        package_id: u64,
    ) -> Result<(Map<String, Value>, u64)> {
        let response = ctx
            .client
            .get(
                &format!(
                    "/api/v4/projects/{}/packages/{package_id}",
                    ctx.project_id
                ),
                &[],
            )
            .await?;

        let mut details = Map::new();
        if response.status != 200 || !response.body.is_object() {
            details.insert("details_available".to_string(), json!(false));
            return Ok((details, 0));
        }

        let mut total_size = 0u64;
        let mut skipped = 0u64;
        let files: Vec<Value> = response.body["package_files"]
            .as_array()
            .map(|files| {
                files
                    .iter()
                    .map(|file| {
                        let size = file["size"].as_u64().unwrap_or(0);
                        total_size += size;
                        let too_large = size > MAX_PACKAGE_FILE_BYTES;
                        if too_large {
                            skipped += 1;
                        }
                        json!({
                            "id": file["id"],
                            "file_name": file["file_name"],
                            "size": size,
                            "file_md5": file["file_md5"],
                            "file_sha1": file["file_sha1"],
                            "file_sha256": file["file_sha256"],
                            "created_at": file["created_at"],
                            "download_skipped": too_large,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        details.insert("details_available".to_string(), json!(true));
        details.insert("package_files".to_string(), Value::Array(files));
        details.insert("total_size".to_string(), json!(total_size));
        details.insert("tags".to_string(), response.body["tags"].clone());

        let pipeline = &response.body["pipeline"];
        if pipeline.is_object() {
            details.insert(
                "pipeline".to_string(),
                json!({
                    "id": pipeline["id"],
                    "sha": pipeline["sha"],
                    "ref": pipeline["ref"],
                    "status": pipeline["status"],
                    "web_url": pipeline["web_url"],
                }),
            );
        }

        Ok((details, skipped))
    }
}
