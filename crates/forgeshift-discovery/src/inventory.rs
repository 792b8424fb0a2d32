//! Inventory document and builder

use crate::enrichment::EnrichmentProfile;
use crate::readiness::Readiness;
use crate::scoring::{Breakdown, Bucket, CiProfileReport, Confidence, MigrationEstimate, RepoProfile, ScopeFlags};
use crate::state::{AgentState, ProjectState};
use forgeshift_core::{Detection, IssueCounts, MrCounts, StepError, Visibility};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub groups: u64,
    pub projects: u64,
    pub errors: u64,
    pub api_calls: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunInfo {
    pub started_at: String,
    pub finished_at: String,
    pub base_url: String,
    pub root_group: String,
    pub stats: RunStats,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupEntry {
    pub id: u64,
    pub full_path: String,
    pub projects: Vec<u64>,
}

/// The small, always-present fact set plus deep-mode extensions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectFacts {
    pub has_ci: Detection,
    pub has_lfs: Detection,
    pub mr_counts: MrCounts,
    pub issue_counts: IssueCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_profile: Option<RepoProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_profile: Option<CiProfileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_estimate: Option<WorkScoreSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentProfile>,
}

/// Compact work-score view kept inside facts for at-a-glance triage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkScoreSummary {
    pub work_score: u32,
    pub bucket: Bucket,
    pub drivers: Vec<String>,
}

/// Hour estimate as published in the inventory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EstimateEntry {
    pub hours_low: f64,
    pub hours_high: f64,
    pub confidence: Confidence,
    pub drivers: Vec<String>,
    pub blockers: Vec<String>,
    pub unknowns: Vec<String>,
    pub scope_flags: ScopeFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Breakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_notes: Option<serde_json::Value>,
}

impl From<&MigrationEstimate> for EstimateEntry {
    fn from(estimate: &MigrationEstimate) -> Self {
        Self {
            hours_low: estimate.hours_low,
            hours_high: estimate.hours_high,
            confidence: estimate.confidence,
            drivers: estimate.drivers.clone(),
            blockers: estimate.blockers.clone(),
            unknowns: estimate.unknowns.clone(),
            scope_flags: estimate.scope_flags,
            breakdown: estimate.breakdown.clone(),
            critical_notes: estimate.critical_notes.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub id: u64,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
    pub archived: bool,
    pub visibility: Visibility,
    pub facts: ProjectFacts,
    pub readiness: Readiness,
    pub errors: Vec<StepError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<EstimateEntry>,
}

/// The immutable, schema-validated output of a discovery run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Inventory {
    pub run: RunInfo,
    pub groups: Vec<GroupEntry>,
    pub projects: Vec<ProjectEntry>,
}

/// Assemble the inventory from final agent state, deterministically
/// sorted: groups by full path, projects by namespace path.
pub fn build_inventory(
    state: &AgentState,
    started_at: String,
    finished_at: String,
    base_url: String,
    root_group: String,
) -> Inventory {
    let mut groups: Vec<GroupEntry> = state
        .groups
        .values()
        .map(|group| GroupEntry {
            id: group.id,
            full_path: group.full_path.clone(),
            projects: group.project_ids.clone(),
        })
        .collect();
    groups.sort_by(|a, b| a.full_path.cmp(&b.full_path));

    let mut projects: Vec<ProjectEntry> =
        state.projects.values().map(project_entry).collect();
    projects.sort_by(|a, b| a.path_with_namespace.cmp(&b.path_with_namespace));

    let stats = RunStats {
        groups: groups.len() as u64,
        projects: projects.len() as u64,
        errors: projects.iter().map(|p| p.errors.len() as u64).sum(),
        api_calls: state.total_api_calls,
    };

    Inventory {
        run: RunInfo {
            started_at,
            finished_at,
            base_url,
            root_group,
            stats,
        },
        groups,
        projects,
    }
}

fn project_entry(project: &ProjectState) -> ProjectEntry {
    let readiness = crate::readiness::compute_readiness(project);
    ProjectEntry {
        id: project.id,
        path_with_namespace: project.path_with_namespace.clone(),
        default_branch: project.default_branch.clone(),
        archived: project.archived,
        visibility: project.visibility,
        facts: ProjectFacts {
            has_ci: project.has_ci,
            has_lfs: project.has_lfs,
            mr_counts: project.mr_counts.clone(),
            issue_counts: project.issue_counts.clone(),
            repo_profile: project.repo_profile.clone(),
            ci_profile: project.ci_profile.clone(),
            migration_estimate: project.estimate.as_ref().map(|e| WorkScoreSummary {
                work_score: e.work_score,
                bucket: e.bucket,
                drivers: e.drivers.clone(),
            }),
            enrichment: project.enrichment.clone(),
        },
        readiness,
        errors: project.errors.clone(),
        estimate: project.estimate.as_ref().map(EstimateEntry::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanMode;
    use forgeshift_core::Count;

    #[test]
    fn builder_sorts_and_counts() {
        let mut state = AgentState::new(ScanMode::RootGroup("acme".to_string()), 100, 200);
        state.add_group(2, "acme/zeta");
        state.add_group(1, "acme/alpha");

        let mut p1 = ProjectState::new(
            11,
            "acme/zeta/one",
            Some("main".to_string()),
            false,
            Visibility::Private,
            2,
        );
        p1.has_ci = Detection::No;
        p1.has_lfs = Detection::No;
        p1.mr_counts = MrCounts::Known {
            open: Count::Exact(0),
            merged: Count::Exact(0),
            closed: Count::Exact(0),
            total: Count::Exact(0),
        };
        p1.issue_counts = IssueCounts::Known {
            open: Count::Exact(0),
            closed: Count::Exact(0),
            total: Count::Exact(0),
        };
        p1.add_error(StepError::new("detect_ci", "forbidden", Some(403)));
        let mut p2 = p1.clone();
        p2.id = 10;
        p2.path_with_namespace = "acme/alpha/two".to_string();
        p2.errors.clear();

        state.add_project(p1);
        state.add_project(p2);
        state.groups.get_mut(&2).unwrap().project_ids.push(11);
        state.groups.get_mut(&1).unwrap().project_ids.push(10);
        state.total_api_calls = 42;

        let inventory = build_inventory(
            &state,
            "2024-01-01T00:00:00Z".to_string(),
            "2024-01-01T00:10:00Z".to_string(),
            "https://gitlab.example.com".to_string(),
            "acme".to_string(),
        );

        assert_eq!(inventory.run.stats.groups, 2);
        assert_eq!(inventory.run.stats.projects, 2);
        assert_eq!(inventory.run.stats.errors, 1);
        assert_eq!(inventory.run.stats.api_calls, 42);
        assert_eq!(inventory.groups[0].full_path, "acme/alpha");
        assert_eq!(inventory.projects[0].path_with_namespace, "acme/alpha/two");
        // Group membership is consistent with project group ids.
        assert_eq!(inventory.groups[1].projects, vec![11]);
    }
}
