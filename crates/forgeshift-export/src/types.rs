//! Export domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The eight independent export components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Repository,
    CiCd,
    Issues,
    MergeRequests,
    Wiki,
    Releases,
    Packages,
    Settings,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 8] = [
        ComponentKind::Repository,
        ComponentKind::CiCd,
        ComponentKind::Issues,
        ComponentKind::MergeRequests,
        ComponentKind::Wiki,
        ComponentKind::Releases,
        ComponentKind::Packages,
        ComponentKind::Settings,
    ];

    /// Artifact subdirectory name for this component.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::CiCd => "cicd",
            Self::Issues => "issues",
            Self::MergeRequests => "merge_requests",
            Self::Wiki => "wiki",
            Self::Releases => "releases",
            Self::Packages => "packages",
            Self::Settings => "settings",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = serde_json::to_value(self).expect("serializable tag");
        write!(f, "{}", tag.as_str().unwrap_or_default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// Per-component outcome: a status plus the component's own summary
/// payload (what it wrote and any sub-step errors).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentReport {
    pub component: ComponentKind,
    pub status: ExportStatus,
    pub summary: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentReport {
    pub fn completed(component: ComponentKind, summary: serde_json::Value) -> Self {
        Self {
            component,
            status: ExportStatus::Completed,
            summary,
            error: None,
        }
    }

    pub fn skipped(component: ComponentKind, reason: &str) -> Self {
        Self {
            component,
            status: ExportStatus::Skipped,
            summary: serde_json::json!({ "reason": reason }),
            error: None,
        }
    }

    pub fn failed(component: ComponentKind, error: String) -> Self {
        Self {
            component,
            status: ExportStatus::Failed,
            summary: serde_json::Value::Null,
            error: Some(error),
        }
    }
}

/// Result of one project export run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportResult {
    pub project_id: u64,
    pub project_path: String,
    pub run_id: String,
    pub output_dir: String,
    pub status: ExportStatus,
    pub components: BTreeMap<ComponentKind, ComponentReport>,
    pub started_at: String,
    pub finished_at: String,
}
