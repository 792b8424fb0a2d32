//! Run-scoped mutable state for the discovery agent

use crate::config::ScanMode;
use crate::enrichment::EnrichmentProfile;
use crate::scoring::{CiProfileReport, MigrationEstimate, RepoProfile};
use forgeshift_core::{Detection, IssueCounts, MrCounts, StepError, Visibility};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Discovery progress for one project.
#[derive(Clone, Debug)]
pub struct ProjectState {
    pub id: u64,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
    pub archived: bool,
    pub visibility: Visibility,
    pub group_id: u64,
    pub wiki_enabled: bool,

    // Fact-gathering progress
    pub details_fetched: bool,
    pub ci_checked: bool,
    pub lfs_checked: bool,
    pub mr_counts_fetched: bool,
    pub issue_counts_fetched: bool,

    // Discovered facts
    pub has_ci: Detection,
    pub has_lfs: Detection,
    pub mr_counts: MrCounts,
    pub issue_counts: IssueCounts,

    // Deep-mode enrichment
    pub repo_profile: Option<RepoProfile>,
    pub ci_profile: Option<CiProfileReport>,
    pub enrichment: Option<EnrichmentProfile>,
    pub estimate: Option<MigrationEstimate>,

    pub errors: Vec<StepError>,
    pub api_calls_used: u64,
}

impl ProjectState {
    pub fn new(
        id: u64,
        path_with_namespace: impl Into<String>,
        default_branch: Option<String>,
        archived: bool,
        visibility: Visibility,
        group_id: u64,
    ) -> Self {
        Self {
            id,
            path_with_namespace: path_with_namespace.into(),
            default_branch,
            archived,
            visibility,
            group_id,
            wiki_enabled: false,
            details_fetched: false,
            ci_checked: false,
            lfs_checked: false,
            mr_counts_fetched: false,
            issue_counts_fetched: false,
            has_ci: Detection::Unknown,
            has_lfs: Detection::Unknown,
            mr_counts: MrCounts::unknown(),
            issue_counts: IssueCounts::unknown(),
            repo_profile: None,
            ci_profile: None,
            enrichment: None,
            estimate: None,
            errors: Vec::new(),
            api_calls_used: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.details_fetched
            && self.ci_checked
            && self.lfs_checked
            && self.mr_counts_fetched
            && self.issue_counts_fetched
    }

    pub fn add_error(&mut self, error: StepError) {
        self.errors.push(error);
    }
}

/// Discovery progress for one group.
#[derive(Clone, Debug)]
pub struct GroupState {
    pub id: u64,
    pub full_path: String,
    pub subgroups_listed: bool,
    pub projects_listed: bool,
    pub subgroup_ids: Vec<u64>,
    pub project_ids: Vec<u64>,
}

impl GroupState {
    pub fn new(id: u64, full_path: impl Into<String>) -> Self {
        Self {
            id,
            full_path: full_path.into(),
            subgroups_listed: false,
            projects_listed: false,
            subgroup_ids: Vec::new(),
            project_ids: Vec::new(),
        }
    }
}

/// Complete state of a discovery run: what has been found, what is
/// pending, and how much budget remains.
#[derive(Debug)]
pub struct AgentState {
    pub mode: ScanMode,
    pub root_group_id: Option<u64>,

    pub groups: BTreeMap<u64, GroupState>,
    pub pending_groups: Vec<u64>,
    pub completed_groups: BTreeSet<u64>,

    pub projects: BTreeMap<u64, ProjectState>,
    pub pending_projects: Vec<u64>,
    pub completed_projects: BTreeSet<u64>,

    pub total_api_calls: u64,
    pub max_api_calls: u64,
    pub max_per_project_calls: u64,

    pub health_checked: bool,
    pub budget_exceeded: bool,
    pub all_groups_listed: bool,
    pub single_project_resolved: bool,
}

impl AgentState {
    pub fn new(mode: ScanMode, max_api_calls: u64, max_per_project_calls: u64) -> Self {
        Self {
            mode,
            root_group_id: None,
            groups: BTreeMap::new(),
            pending_groups: Vec::new(),
            completed_groups: BTreeSet::new(),
            projects: BTreeMap::new(),
            pending_projects: Vec::new(),
            completed_projects: BTreeSet::new(),
            total_api_calls: 0,
            max_api_calls,
            max_per_project_calls,
            health_checked: false,
            budget_exceeded: false,
            all_groups_listed: false,
            single_project_resolved: false,
        }
    }

    /// Register one API call against the global budget (and the
    /// project's, when attributed). Returns `false` once the ceiling is
    /// crossed; an in-flight call may push the counter one past it.
    pub fn register_api_call(&mut self, project_id: Option<u64>) -> bool {
        self.total_api_calls += 1;

        if let Some(id) = project_id {
            if let Some(project) = self.projects.get_mut(&id) {
                project.api_calls_used += 1;
                if project.api_calls_used > self.max_per_project_calls {
                    warn!(
                        project = %project.path_with_namespace,
                        "per-project budget exceeded"
                    );
                }
            }
        }

        if self.total_api_calls >= self.max_api_calls {
            self.budget_exceeded = true;
            warn!(max = self.max_api_calls, "total api call budget exceeded");
            return false;
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        match &self.mode {
            ScanMode::SingleProject(_) => {
                self.pending_projects.is_empty() && self.single_project_resolved
            }
            ScanMode::DiscoverAll => {
                self.pending_groups.is_empty()
                    && self.pending_projects.is_empty()
                    && self.all_groups_listed
            }
            ScanMode::RootGroup(_) => {
                self.pending_groups.is_empty()
                    && self.pending_projects.is_empty()
                    && self.root_group_id.is_some()
            }
        }
    }

    pub fn add_group(&mut self, id: u64, full_path: &str) {
        if !self.groups.contains_key(&id) {
            self.groups.insert(id, GroupState::new(id, full_path));
            self.pending_groups.push(id);
        }
    }

    pub fn add_project(&mut self, project: ProjectState) {
        let id = project.id;
        if !self.projects.contains_key(&id) {
            self.projects.insert(id, project);
            self.pending_projects.push(id);
        }
    }

    pub fn complete_project(&mut self, id: u64) {
        self.pending_projects.retain(|p| *p != id);
        self.completed_projects.insert(id);
    }

    pub fn complete_group(&mut self, id: u64) {
        self.pending_groups.retain(|g| *g != id);
        self.completed_groups.insert(id);
    }

    pub fn total_errors(&self) -> u64 {
        self.projects.values().map(|p| p.errors.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_refuses_past_the_ceiling() {
        let mut state = AgentState::new(ScanMode::DiscoverAll, 3, 200);
        assert!(state.register_api_call(None));
        assert!(state.register_api_call(None));
        // Third call reaches the ceiling: refused, counter is at max.
        assert!(!state.register_api_call(None));
        assert!(state.budget_exceeded);
        assert_eq!(state.total_api_calls, 3);
        // An in-flight call may still land one past the ceiling.
        assert!(!state.register_api_call(None));
        assert_eq!(state.total_api_calls, 4);
    }

    #[test]
    fn per_project_attribution() {
        let mut state = AgentState::new(ScanMode::DiscoverAll, 100, 2);
        state.add_project(ProjectState::new(
            7,
            "acme/api",
            Some("main".to_string()),
            false,
            Visibility::Private,
            1,
        ));
        state.register_api_call(Some(7));
        state.register_api_call(Some(7));
        state.register_api_call(Some(7));
        assert_eq!(state.projects[&7].api_calls_used, 3);
        assert_eq!(state.total_api_calls, 3);
    }

    #[test]
    fn project_moves_between_pending_and_completed_exactly_once() {
        let mut state = AgentState::new(ScanMode::DiscoverAll, 100, 200);
        state.add_project(ProjectState::new(
            1,
            "g/p",
            None,
            false,
            Visibility::Private,
            1,
        ));
        assert_eq!(state.pending_projects, vec![1]);
        state.complete_project(1);
        assert!(state.pending_projects.is_empty());
        assert!(state.completed_projects.contains(&1));
        // Re-adding the same id is a no-op.
        state.add_project(ProjectState::new(
            1,
            "g/p",
            None,
            false,
            Visibility::Private,
            1,
        ));
        assert!(state.pending_projects.is_empty());
    }
}
