//! Rule-based planner: decide the next discovery action from state

use crate::config::ScanMode;
use crate::state::AgentState;

/// One step the executor can take. Dependencies are encoded in the
/// priority rules below, not in the actions themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    HealthCheck,
    ResolveProject { path: String },
    ListAllGroups,
    ResolveGroup { path: String },
    ListSubgroups { group_id: u64 },
    ListProjects { group_id: u64 },
    DetectCi { project_id: u64 },
    DetectLfs { project_id: u64 },
    GetMrCounts { project_id: u64 },
    GetIssueCounts { project_id: u64 },
    CompleteProject { project_id: u64 },
    Done,
}

/// Produce the single next action, in priority order:
/// health check, mode-specific resolution, group structure discovery,
/// per-project fact gathering (CI → LFS → MR counts → issue counts),
/// project completion, done.
pub fn next_action(state: &AgentState) -> Action {
    if state.budget_exceeded {
        return Action::Done;
    }

    if !state.health_checked {
        return Action::HealthCheck;
    }

    match &state.mode {
        ScanMode::SingleProject(path) if !state.single_project_resolved => {
            return Action::ResolveProject { path: path.clone() };
        }
        ScanMode::DiscoverAll if !state.all_groups_listed => {
            return Action::ListAllGroups;
        }
        ScanMode::RootGroup(path) if state.root_group_id.is_none() => {
            return Action::ResolveGroup { path: path.clone() };
        }
        _ => {}
    }

    // Structure discovery before facts.
    if !matches!(state.mode, ScanMode::SingleProject(_)) {
        for group_id in &state.pending_groups {
            let Some(group) = state.groups.get(group_id) else {
                continue;
            };
            if !group.subgroups_listed {
                return Action::ListSubgroups {
                    group_id: *group_id,
                };
            }
            if !group.projects_listed {
                return Action::ListProjects {
                    group_id: *group_id,
                };
            }
        }
    }

    // Facts across all pending projects come before any completion, so
    // a budget-starved project never blocks others' fact gathering.
    for project_id in &state.pending_projects {
        let Some(project) = state.projects.get(project_id) else {
            continue;
        };
        if project.api_calls_used >= state.max_per_project_calls {
            continue;
        }
        if !project.ci_checked {
            return Action::DetectCi {
                project_id: *project_id,
            };
        }
        if !project.lfs_checked {
            return Action::DetectLfs {
                project_id: *project_id,
            };
        }
        if !project.mr_counts_fetched {
            return Action::GetMrCounts {
                project_id: *project_id,
            };
        }
        if !project.issue_counts_fetched {
            return Action::GetIssueCounts {
                project_id: *project_id,
            };
        }
    }

    for project_id in &state.pending_projects {
        let Some(project) = state.projects.get(project_id) else {
            continue;
        };
        if project.api_calls_used >= state.max_per_project_calls || fully_fact_checked(project) {
            return Action::CompleteProject {
                project_id: *project_id,
            };
        }
    }

    Action::Done
}

fn fully_fact_checked(project: &crate::state::ProjectState) -> bool {
    project.ci_checked
        && project.lfs_checked
        && project.mr_counts_fetched
        && project.issue_counts_fetched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ProjectState;
    use forgeshift_core::Visibility;

    fn project(id: u64) -> ProjectState {
        ProjectState::new(
            id,
            format!("acme/p{id}"),
            Some("main".to_string()),
            false,
            Visibility::Private,
            1,
        )
    }

    #[test]
    fn health_check_comes_first() {
        let state = AgentState::new(ScanMode::DiscoverAll, 100, 200);
        assert_eq!(next_action(&state), Action::HealthCheck);
    }

    #[test]
    fn budget_exceeded_short_circuits_to_done() {
        let mut state = AgentState::new(ScanMode::DiscoverAll, 100, 200);
        state.budget_exceeded = true;
        assert_eq!(next_action(&state), Action::Done);
    }

    #[test]
    fn single_project_mode_resolves_before_anything_else() {
        let mut state = AgentState::new(
            ScanMode::SingleProject("acme/api".to_string()),
            100,
            200,
        );
        state.health_checked = true;
        assert_eq!(
            next_action(&state),
            Action::ResolveProject {
                path: "acme/api".to_string()
            }
        );
    }

    #[test]
    fn group_structure_before_project_facts() {
        let mut state = AgentState::new(ScanMode::RootGroup("acme".to_string()), 100, 200);
        state.health_checked = true;
        assert_eq!(
            next_action(&state),
            Action::ResolveGroup {
                path: "acme".to_string()
            }
        );

        state.root_group_id = Some(1);
        state.add_group(1, "acme");
        state.add_project(project(10));
        assert_eq!(next_action(&state), Action::ListSubgroups { group_id: 1 });

        state.groups.get_mut(&1).unwrap().subgroups_listed = true;
        assert_eq!(next_action(&state), Action::ListProjects { group_id: 1 });

        state.groups.get_mut(&1).unwrap().projects_listed = true;
        state.complete_group(1);
        assert_eq!(next_action(&state), Action::DetectCi { project_id: 10 });
    }

    #[test]
    fn facts_in_order_then_complete() {
        let mut state = AgentState::new(ScanMode::DiscoverAll, 100, 200);
        state.health_checked = true;
        state.all_groups_listed = true;
        state.add_project(project(10));

        assert_eq!(next_action(&state), Action::DetectCi { project_id: 10 });
        state.projects.get_mut(&10).unwrap().ci_checked = true;
        assert_eq!(next_action(&state), Action::DetectLfs { project_id: 10 });
        state.projects.get_mut(&10).unwrap().lfs_checked = true;
        assert_eq!(next_action(&state), Action::GetMrCounts { project_id: 10 });
        state.projects.get_mut(&10).unwrap().mr_counts_fetched = true;
        assert_eq!(
            next_action(&state),
            Action::GetIssueCounts { project_id: 10 }
        );
        state.projects.get_mut(&10).unwrap().issue_counts_fetched = true;
        assert_eq!(
            next_action(&state),
            Action::CompleteProject { project_id: 10 }
        );
        state.complete_project(10);
        assert_eq!(next_action(&state), Action::Done);
    }

    #[test]
    fn facts_for_all_projects_before_any_completion() {
        let mut state = AgentState::new(ScanMode::DiscoverAll, 100, 200);
        state.health_checked = true;
        state.all_groups_listed = true;
        state.add_project(project(10));
        state.add_project(project(11));

        // Project 10 fully fact-checked; 11 untouched.
        {
            let p = state.projects.get_mut(&10).unwrap();
            p.ci_checked = true;
            p.lfs_checked = true;
            p.mr_counts_fetched = true;
            p.issue_counts_fetched = true;
        }
        assert_eq!(next_action(&state), Action::DetectCi { project_id: 11 });
    }

    #[test]
    fn per_project_budget_forces_completion_with_partial_facts() {
        let mut state = AgentState::new(ScanMode::DiscoverAll, 1000, 5);
        state.health_checked = true;
        state.all_groups_listed = true;
        let mut p = project(10);
        p.api_calls_used = 5;
        state.add_project(p);
        assert_eq!(
            next_action(&state),
            Action::CompleteProject { project_id: 10 }
        );
    }
}
