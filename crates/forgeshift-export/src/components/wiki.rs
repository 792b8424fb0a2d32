//! Wiki component: pages written by slug with format-derived extension

use super::{collect_pages, record_step_error, save_json, ExportComponent, ExportContext};
use crate::types::{ComponentKind, ComponentReport};
use forgeshift_core::{Error, Result};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{error, info};

pub struct WikiComponent;

fn extension_for_format(format: &str) -> &'static str {
    match format {
        "markdown" => "md",
        "rdoc" => "rdoc",
        "asciidoc" => "adoc",
        "org" => "org",
        _ => "txt",
    }
}

fn slug_filename(slug: &str, format: &str) -> String {
    // Slugs may contain separators; keep them filesystem-safe.
    let safe = slug.replace('/', "-");
    format!("{safe}.{}", extension_for_format(format))
}

#[async_trait::async_trait]
impl ExportComponent for WikiComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Wiki
    }

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport> {
        info!(project_id = ctx.project_id, "exporting wiki");
        let dir = ctx.component_dir(self.kind())?;
        let mut summary = json!({ "project_id": ctx.project_id });

        if !ctx.project["wiki_enabled"].as_bool().unwrap_or(false) {
            info!("wiki not enabled");
            summary["reason"] = json!("wiki_not_enabled");
            save_json(&dir.join("wiki.json"), &summary)?;
            return Ok(ComponentReport::skipped(self.kind(), "wiki_not_enabled"));
        }

        match self.export_pages(ctx, &dir).await {
            Ok(pages) => summary["wiki_pages"] = pages,
            Err(e) => record_step_error(&mut summary, "wiki_pages", &e),
        }

        save_json(&dir.join("wiki.json"), &summary)?;
        Ok(ComponentReport::completed(self.kind(), summary))
    }
}

impl WikiComponent {
    async fn export_pages(&self, ctx: &ExportContext, dir: &Path) -> Result<Value> {
        let items = collect_pages(
            &ctx.client,
            &format!("/api/v4/projects/{}/wikis", ctx.project_id),
            &[],
            None,
        )
        .await?;

        if items.is_empty() {
            return Ok(json!({ "total": 0, "note": "No wiki pages found" }));
        }

        let pages_dir = dir.join("pages");
        std::fs::create_dir_all(&pages_dir)?;

        let mut pages: Vec<Value> = Vec::new();
        for page in &items {
            let slug = page["slug"].as_str().unwrap_or_default().to_string();
            let format = page["format"].as_str().unwrap_or("markdown").to_string();
            let mut record = json!({
                "slug": slug,
                "title": page["title"],
                "format": format,
            });

            match self.fetch_page(ctx, &slug).await {
                Ok(content) => {
                    std::fs::write(pages_dir.join(slug_filename(&slug, &format)), &content)?;
                    record["content"] = json!(content);
                }
                Err(e) => {
                    error!(slug = %slug, error = %e, "failed to fetch wiki page");
                    record["error"] = json!(forgeshift_core::redact_secrets(&e.to_string()));
                }
            }
            pages.push(record);
        }

        save_json(&dir.join("wiki_pages.json"), &Value::Array(pages))?;
        Ok(json!({
            "total": items.len(),
            "file": "wiki_pages.json",
            "pages_dir": "pages/",
        }))
    }

    async fn fetch_page(&self, ctx: &ExportContext, slug: &str) -> Result<String> {
        let encoded = forgeshift_client::GitLabClient::encode_path(slug);
        let response = ctx
            .client
            .get(
                &format!("/api/v4/projects/{}/wikis/{encoded}", ctx.project_id),
                &[],
            )
            .await?;
        if response.status != 200 {
            return Err(Error::from_status(
                response.status,
                "wiki_page",
                response.text(),
            ));
        }
        Ok(response.body["content"].as_str().unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_follow_the_page_format() {
        assert_eq!(slug_filename("home", "markdown"), "home.md");
        assert_eq!(slug_filename("api/auth", "asciidoc"), "api-auth.adoc");
        assert_eq!(slug_filename("notes", "creole"), "notes.txt");
    }
}
