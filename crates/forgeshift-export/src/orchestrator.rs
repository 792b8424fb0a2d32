//! Project export orchestration with checkpointed resume

use crate::checkpoint::CheckpointStore;
use crate::components::{all_components, ExportContext};
use crate::types::{ComponentReport, ExportResult, ExportStatus};
use forgeshift_client::GitLabClient;
use forgeshift_core::util::{now_iso, write_json_atomic};
use forgeshift_core::{redact_secrets, Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Resume an earlier run by passing its id; otherwise a fresh run
    /// id is generated.
    pub run_id: Option<String>,
}

pub struct ExportOrchestrator {
    client: Arc<GitLabClient>,
    store: CheckpointStore,
    options: ExportOptions,
    cancel: CancellationToken,
}

impl ExportOrchestrator {
    pub fn new(client: Arc<GitLabClient>, options: ExportOptions) -> Self {
        Self {
            client,
            store: CheckpointStore::new(options.output_dir.clone()),
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Export one project. Components run in their canonical order;
    /// one failing component never stops the others. The checkpoint is
    /// saved after every clean component return.
    pub async fn export_project(&self, project: &str) -> Result<ExportResult> {
        let started_at = now_iso();

        let project_payload = self.fetch_project(project).await?;
        let project_id = project_payload["id"]
            .as_u64()
            .ok_or_else(|| Error::internal("project payload missing id"))?;
        let project_path = project_payload["path_with_namespace"]
            .as_str()
            .unwrap_or(project)
            .to_string();

        let run_id = self
            .options
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let run_dir = self.store.run_dir(project_id, &run_id);
        std::fs::create_dir_all(&run_dir)?;

        info!(project = %project_path, project_id, run_id = %run_id, "starting export");

        let mut checkpoint = self.store.load(project_id, &run_id);
        let ctx = ExportContext {
            client: self.client.clone(),
            project_id,
            project: project_payload,
            run_dir: run_dir.clone(),
        };

        let mut components: BTreeMap<_, ComponentReport> = BTreeMap::new();
        for component in all_components() {
            let kind = component.kind();

            if self.cancel.is_cancelled() {
                warn!(component = %kind, "export cancelled, remaining components skipped");
                components.insert(kind, ComponentReport::skipped(kind, "cancelled"));
                continue;
            }

            if checkpoint.is_component_completed(kind) {
                info!(component = %kind, "already completed in checkpoint, skipping");
                components.insert(
                    kind,
                    ComponentReport::skipped(kind, "completed_in_previous_run"),
                );
                continue;
            }

            match component.export(&ctx).await {
                Ok(report) => {
                    checkpoint.mark_component_completed(kind);
                    self.store.save(&mut checkpoint)?;
                    components.insert(kind, report);
                }
                Err(e) => {
                    let message = redact_secrets(&e.to_string());
                    error!(component = %kind, error = %message, "component failed");
                    components.insert(kind, ComponentReport::failed(kind, message));
                }
            }
        }

        let status = if components
            .values()
            .any(|report| report.status == ExportStatus::Failed)
        {
            ExportStatus::Failed
        } else {
            ExportStatus::Completed
        };

        let result = ExportResult {
            project_id,
            project_path,
            run_id,
            output_dir: run_dir.to_string_lossy().into_owned(),
            status,
            components,
            started_at,
            finished_at: now_iso(),
        };

        write_json_atomic(&run_dir.join("export_result.json"), &result)?;
        info!(status = ?result.status, "export finished");
        Ok(result)
    }

    async fn fetch_project(&self, project: &str) -> Result<serde_json::Value> {
        let path = if project.chars().all(|c| c.is_ascii_digit()) {
            format!("/api/v4/projects/{project}")
        } else {
            format!("/api/v4/projects/{}", GitLabClient::encode_path(project))
        };
        let response = self.client.get(&path, &[]).await?;
        if response.status != 200 {
            return Err(Error::from_status(
                response.status,
                "fetch_project",
                redact_secrets(&response.text()),
            ));
        }
        Ok(response.body)
    }
}
