//! Resumable per-run checkpoint state
//!
//! One JSON file per (project, run). `completed_components` only ever
//! grows within a run; deleting the file forces a fresh export. Writes
//! are temp-then-rename so a crash never leaves a torn checkpoint.

use crate::types::ComponentKind;
use forgeshift_core::util::{now_iso, write_json_atomic};
use forgeshift_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const CHECKPOINT_FILENAME: &str = "checkpoint.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointState {
    pub project_id: u64,
    pub run_id: String,
    pub completed_components: Vec<ComponentKind>,
    pub last_checkpoint_at: Option<String>,
    pub partial_state: BTreeMap<String, Value>,
}

impl CheckpointState {
    pub fn new(project_id: u64, run_id: impl Into<String>) -> Self {
        Self {
            project_id,
            run_id: run_id.into(),
            completed_components: Vec::new(),
            last_checkpoint_at: None,
            partial_state: BTreeMap::new(),
        }
    }

    pub fn is_component_completed(&self, component: ComponentKind) -> bool {
        self.completed_components.contains(&component)
    }

    /// Record a component as done. The set is append-only.
    pub fn mark_component_completed(&mut self, component: ComponentKind) {
        if !self.completed_components.contains(&component) {
            self.completed_components.push(component);
            debug!(component = %component, "marked component completed");
        }
    }

    pub fn partial(&self, key: &str) -> Option<&Value> {
        self.partial_state.get(key)
    }

    pub fn set_partial(&mut self, key: impl Into<String>, value: Value) {
        self.partial_state.insert(key.into(), value);
    }

    pub fn clear_partial(&mut self, key: &str) {
        self.partial_state.remove(key);
    }
}

/// Filesystem store for checkpoints, rooted at the export output dir.
pub struct CheckpointStore {
    output_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn checkpoint_path(&self, project_id: u64, run_id: &str) -> PathBuf {
        self.output_dir
            .join(project_id.to_string())
            .join(run_id)
            .join(CHECKPOINT_FILENAME)
    }

    pub fn run_dir(&self, project_id: u64, run_id: &str) -> PathBuf {
        self.output_dir.join(project_id.to_string()).join(run_id)
    }

    pub fn exists(&self, project_id: u64, run_id: &str) -> bool {
        self.checkpoint_path(project_id, run_id).exists()
    }

    /// Load the checkpoint, or start fresh when it is absent or
    /// unreadable.
    pub fn load(&self, project_id: u64, run_id: &str) -> CheckpointState {
        let path = self.checkpoint_path(project_id, run_id);
        if !path.exists() {
            info!(project_id, run_id, "no checkpoint found, starting fresh");
            return CheckpointState::new(project_id, run_id);
        }
        match forgeshift_core::util::read_json::<CheckpointState>(&path) {
            Ok(state) => {
                info!(
                    project_id,
                    completed = state.completed_components.len(),
                    "loaded checkpoint"
                );
                state
            }
            Err(e) => {
                warn!(error = %e, "failed to load checkpoint, starting fresh");
                CheckpointState::new(project_id, run_id)
            }
        }
    }

    pub fn save(&self, state: &mut CheckpointState) -> Result<()> {
        state.last_checkpoint_at = Some(now_iso());
        let path = self.checkpoint_path(state.project_id, &state.run_id);
        write_json_atomic(&path, state)?;
        debug!(
            project_id = state.project_id,
            completed = state.completed_components.len(),
            "saved checkpoint"
        );
        Ok(())
    }

    pub fn delete(&self, project_id: u64, run_id: &str) -> Result<()> {
        let path = self.checkpoint_path(project_id, run_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
            info!(project_id, run_id, "deleted checkpoint");
        }
        Ok(())
    }
}
