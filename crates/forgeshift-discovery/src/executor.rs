//! Action execution and state transitions for discovery

use crate::planner::Action;
use crate::state::{AgentState, ProjectState};
use crate::tools::GitLabTools;
use forgeshift_core::{IssueCounts, MrCounts, Visibility};
use tracing::{debug, error, info};

fn parse_visibility(raw: &str) -> Visibility {
    match raw {
        "public" => Visibility::Public,
        "internal" => Visibility::Internal,
        _ => Visibility::Private,
    }
}

pub struct Executor<'a> {
    tools: &'a GitLabTools,
}

impl<'a> Executor<'a> {
    pub fn new(tools: &'a GitLabTools) -> Self {
        Self { tools }
    }

    /// Execute one action against the state. Returns whether the action
    /// succeeded; failures are recorded and discovery continues.
    pub async fn execute(&self, state: &mut AgentState, action: &Action) -> bool {
        debug!(?action, "executing");
        match action {
            Action::HealthCheck => self.health_check(state).await,
            Action::ResolveProject { path } => self.resolve_project(state, path).await,
            Action::ListAllGroups => self.list_all_groups(state).await,
            Action::ResolveGroup { path } => self.resolve_group(state, path).await,
            Action::ListSubgroups { group_id } => self.list_subgroups(state, *group_id).await,
            Action::ListProjects { group_id } => self.list_projects(state, *group_id).await,
            Action::DetectCi { project_id } => self.detect_ci(state, *project_id).await,
            Action::DetectLfs { project_id } => self.detect_lfs(state, *project_id).await,
            Action::GetMrCounts { project_id } => self.get_mr_counts(state, *project_id).await,
            Action::GetIssueCounts { project_id } => {
                self.get_issue_counts(state, *project_id).await
            }
            Action::CompleteProject { project_id } => {
                state.complete_project(*project_id);
                debug!(project_id, "completed project");
                true
            }
            Action::Done => true,
        }
    }

    async fn health_check(&self, state: &mut AgentState) -> bool {
        if !state.register_api_call(None) {
            return false;
        }
        state.health_checked = true;
        match self.tools.health_check().await {
            Ok(report) if report.ok => {
                info!(message = %report.message, "health check passed");
                true
            }
            Ok(report) => {
                error!(message = %report.message, "health check failed");
                false
            }
            Err(e) => {
                error!(message = %e.message, "health check failed");
                false
            }
        }
    }

    async fn resolve_group(&self, state: &mut AgentState, path: &str) -> bool {
        if !state.register_api_call(None) {
            return false;
        }
        match self.tools.resolve_group(path).await {
            Ok(group_id) => {
                state.root_group_id = Some(group_id);
                state.add_group(group_id, path);
                info!(group = path, group_id, "resolved root group");
                true
            }
            Err(e) => {
                error!(group = path, message = %e.message, "failed to resolve group");
                false
            }
        }
    }

    async fn resolve_project(&self, state: &mut AgentState, path: &str) -> bool {
        if !state.register_api_call(None) {
            return false;
        }
        match self.tools.resolve_project(path).await {
            Ok(info) => {
                let mut project = ProjectState::new(
                    info.id,
                    info.path_with_namespace,
                    info.default_branch,
                    info.archived,
                    parse_visibility(&info.visibility),
                    0,
                );
                project.wiki_enabled = info.wiki_enabled;
                project.details_fetched = true;
                let id = project.id;
                state.add_project(project);
                state.single_project_resolved = true;
                info!(project = path, project_id = id, "resolved project");
                true
            }
            Err(e) => {
                error!(project = path, message = %e.message, "failed to resolve project");
                false
            }
        }
    }

    async fn list_all_groups(&self, state: &mut AgentState) -> bool {
        if !state.register_api_call(None) {
            return false;
        }
        match self.tools.list_all_groups().await {
            Ok(groups) => {
                for group in &groups {
                    state.add_group(group.id, &group.full_path);
                }
                state.all_groups_listed = true;
                info!(count = groups.len(), "listed accessible top-level groups");
                true
            }
            Err(e) => {
                error!(message = %e.message, "failed to list groups");
                false
            }
        }
    }

    async fn list_subgroups(&self, state: &mut AgentState, group_id: u64) -> bool {
        if !state.register_api_call(None) {
            return false;
        }
        let outcome = self.tools.list_subgroups(group_id).await;
        let Some(group) = state.groups.get_mut(&group_id) else {
            return false;
        };
        group.subgroups_listed = true;

        match outcome {
            Ok(subgroups) => {
                let parent_path = group.full_path.clone();
                let ids: Vec<u64> = subgroups.iter().map(|g| g.id).collect();
                state
                    .groups
                    .get_mut(&group_id)
                    .expect("group exists")
                    .subgroup_ids
                    .extend(&ids);
                for subgroup in subgroups {
                    state.add_group(subgroup.id, &subgroup.full_path);
                }
                debug!(parent = %parent_path, count = ids.len(), "found subgroups");
                true
            }
            Err(e) => {
                error!(group_id, message = %e.message, "failed to list subgroups");
                false
            }
        }
    }

    async fn list_projects(&self, state: &mut AgentState, group_id: u64) -> bool {
        if !state.register_api_call(None) {
            return false;
        }
        let outcome = self.tools.list_projects(group_id).await;
        let Some(group) = state.groups.get_mut(&group_id) else {
            return false;
        };
        group.projects_listed = true;

        match outcome {
            Ok(projects) => {
                for info in projects {
                    let mut project = ProjectState::new(
                        info.id,
                        info.path_with_namespace,
                        info.default_branch,
                        info.archived,
                        parse_visibility(&info.visibility),
                        group_id,
                    );
                    project.wiki_enabled = info.wiki_enabled;
                    // Listing payloads already carry the base details.
                    project.details_fetched = true;
                    let project_id = project.id;
                    state.add_project(project);
                    state
                        .groups
                        .get_mut(&group_id)
                        .expect("group exists")
                        .project_ids
                        .push(project_id);
                }
                let group = &state.groups[&group_id];
                debug!(group = %group.full_path, count = group.project_ids.len(), "found projects");
                if group.subgroups_listed && group.projects_listed {
                    state.complete_group(group_id);
                }
                true
            }
            Err(e) => {
                error!(group_id, message = %e.message, "failed to list projects");
                false
            }
        }
    }

    async fn detect_ci(&self, state: &mut AgentState, project_id: u64) -> bool {
        if !state.projects.contains_key(&project_id) {
            return false;
        }
        if !state.register_api_call(Some(project_id)) {
            return false;
        }
        let git_ref = state.projects[&project_id].default_branch.clone();
        let (detection, error) = self.tools.detect_ci(project_id, git_ref.as_deref()).await;
        let project = state.projects.get_mut(&project_id).expect("project exists");
        project.ci_checked = true;
        project.has_ci = detection;
        if let Some(e) = error {
            project.add_error(e);
            return false;
        }
        true
    }

    async fn detect_lfs(&self, state: &mut AgentState, project_id: u64) -> bool {
        if !state.projects.contains_key(&project_id) {
            return false;
        }
        if !state.register_api_call(Some(project_id)) {
            return false;
        }
        let git_ref = state.projects[&project_id].default_branch.clone();
        let (detection, error) = self.tools.detect_lfs(project_id, git_ref.as_deref()).await;
        let project = state.projects.get_mut(&project_id).expect("project exists");
        project.lfs_checked = true;
        project.has_lfs = detection;
        if let Some(e) = error {
            project.add_error(e);
            return false;
        }
        true
    }

    async fn get_mr_counts(&self, state: &mut AgentState, project_id: u64) -> bool {
        if !state.projects.contains_key(&project_id) {
            return false;
        }
        if !state.register_api_call(Some(project_id)) {
            return false;
        }
        let outcome = self.tools.mr_counts(project_id).await;
        // The state fan-out costs one call per MR state. This is a
        // documented approximation; the extras stop at the ceiling so
        // the counter never lands more than one past it.
        for _ in 0..2 {
            if state.budget_exceeded {
                break;
            }
            state.register_api_call(Some(project_id));
        }

        let project = state.projects.get_mut(&project_id).expect("project exists");
        project.mr_counts_fetched = true;
        match outcome {
            Ok(counts) => {
                project.mr_counts = counts;
                true
            }
            Err(e) => {
                project.mr_counts = MrCounts::unknown();
                project.add_error(e);
                false
            }
        }
    }

    async fn get_issue_counts(&self, state: &mut AgentState, project_id: u64) -> bool {
        if !state.projects.contains_key(&project_id) {
            return false;
        }
        if !state.register_api_call(Some(project_id)) {
            return false;
        }
        let outcome = self.tools.issue_counts(project_id).await;
        // One extra call for the second issue state, same approximation
        // as the MR fan-out.
        if !state.budget_exceeded {
            state.register_api_call(Some(project_id));
        }

        let project = state.projects.get_mut(&project_id).expect("project exists");
        project.issue_counts_fetched = true;
        match outcome {
            Ok(counts) => {
                project.issue_counts = counts;
                true
            }
            Err(e) => {
                project.issue_counts = IssueCounts::unknown();
                project.add_error(e);
                false
            }
        }
    }
}
