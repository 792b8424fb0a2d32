//! Export components: one per artifact subdirectory
//!
//! Components are independent, run in any order, and write only under
//! their own directory. A failing sub-step is recorded in the
//! component summary as `<step>_error`; the component still returns.

pub mod cicd;
pub mod issues;
pub mod merge_requests;
pub mod packages;
pub mod releases;
pub mod repository;
pub mod settings;
pub mod wiki;

use crate::types::{ComponentKind, ComponentReport};
use base64::Engine;
use forgeshift_client::GitLabClient;
use forgeshift_core::{Error, Result};
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a component needs for one project export.
pub struct ExportContext {
    pub client: Arc<GitLabClient>,
    pub project_id: u64,
    /// Full project payload from the source forge.
    pub project: Value,
    /// `<output>/<project_id>/<run_id>/`
    pub run_dir: PathBuf,
}

impl ExportContext {
    /// The component's own artifact directory, created on demand.
    pub fn component_dir(&self, kind: ComponentKind) -> Result<PathBuf> {
        let dir = self.run_dir.join(kind.dir_name());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[async_trait::async_trait]
pub trait ExportComponent: Send + Sync {
    fn kind(&self) -> ComponentKind;

    async fn export(&self, ctx: &ExportContext) -> Result<ComponentReport>;
}

/// All eight components in their canonical order.
pub fn all_components() -> Vec<Box<dyn ExportComponent>> {
    vec![
        Box::new(repository::RepositoryComponent),
        Box::new(cicd::CiCdComponent),
        Box::new(issues::IssuesComponent),
        Box::new(merge_requests::MergeRequestsComponent),
        Box::new(wiki::WikiComponent),
        Box::new(releases::ReleasesComponent),
        Box::new(packages::PackagesComponent),
        Box::new(settings::SettingsComponent),
    ]
}

// --- shared helpers ---

pub(crate) fn save_json(path: &Path, value: &Value) -> Result<()> {
    forgeshift_core::util::write_json_atomic(path, value)
}

/// Collect a paginated listing into memory.
pub(crate) async fn collect_pages(
    client: &GitLabClient,
    path: &str,
    params: &[(String, String)],
    max_items: Option<usize>,
) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let stream = client.paginate(path, params, 100, max_items);
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        items.push(item?);
    }
    Ok(items)
}

/// Trim a user payload to the fields exports carry.
pub(crate) fn extract_user(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    serde_json::json!({
        "id": value["id"],
        "username": value["username"],
        "name": value["name"],
    })
}

/// Fetch a repository file through the files API and decode its
/// base64 payload. `Ok(None)` when the file is absent.
pub(crate) async fn fetch_file_content(
    client: &GitLabClient,
    project_id: u64,
    file_path: &str,
) -> Result<Option<String>> {
    let encoded = GitLabClient::encode_path(file_path);
    let response = client
        .get(
            &format!("/api/v4/projects/{project_id}/repository/files/{encoded}"),
            &[("ref".to_string(), "HEAD".to_string())],
        )
        .await?;

    match response.status {
        200 => {
            let raw = response.body["content"].as_str().unwrap_or_default();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(raw.replace('\n', ""))
                .map_err(|e| Error::internal(format!("invalid base64 payload: {e}")))?;
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
        404 => Ok(None),
        status => Err(Error::from_status(
            status,
            "fetch_file_content",
            response.text(),
        )),
    }
}

/// Record a failing sub-step in the component summary and move on.
pub(crate) fn record_step_error(summary: &mut Value, step: &str, error: &Error) {
    let message = forgeshift_core::redact_secrets(&error.to_string());
    tracing::error!(step, error = %message, "export step failed");
    summary[format!("{step}_error")] = Value::String(message);
}
