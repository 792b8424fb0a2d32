//! Readiness assessment: deterministic rules over facts and errors

use crate::state::ProjectState;
use forgeshift_core::Detection;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Readiness {
    pub complexity: Complexity,
    pub blockers: Vec<String>,
    pub notes: Vec<String>,
}

/// Compute the readiness assessment once fact gathering is done.
pub fn compute_readiness(project: &ProjectState) -> Readiness {
    Readiness {
        complexity: estimate_complexity(project),
        blockers: identify_blockers(project),
        notes: generate_notes(project),
    }
}

/// Archived projects are always low. Otherwise a small additive score:
/// 2 or more is medium, 5 or more is high.
fn estimate_complexity(project: &ProjectState) -> Complexity {
    if project.archived {
        return Complexity::Low;
    }

    let mut score = 0u32;

    match project.has_ci {
        Detection::Yes => score += 2,
        Detection::Unknown => score += 1,
        Detection::No => {}
    }
    match project.has_lfs {
        Detection::Yes => score += 3,
        Detection::Unknown => score += 1,
        Detection::No => {}
    }

    let mr_total = project.mr_counts.total_floor();
    if project.mr_counts.is_truncated() || mr_total > 100 {
        score += 2;
    } else if mr_total > 20 {
        score += 1;
    }

    let issue_total = project.issue_counts.total_floor();
    if project.issue_counts.is_truncated() || issue_total > 500 {
        score += 2;
    } else if issue_total > 100 {
        score += 1;
    }

    match score {
        s if s >= 5 => Complexity::High,
        s if s >= 2 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

fn identify_blockers(project: &ProjectState) -> Vec<String> {
    let mut blockers = Vec::new();

    if project.has_ci.is_yes() {
        blockers.push(
            "Has CI/CD pipeline - requires conversion to destination workflows".to_string(),
        );
    }
    if project.has_lfs.is_yes() {
        blockers.push("Uses Git LFS - requires LFS migration setup".to_string());
    }
    if project.visibility == forgeshift_core::Visibility::Internal {
        blockers.push(
            "Internal visibility has no destination equivalent - must choose private or public"
                .to_string(),
        );
    }
    for error in &project.errors {
        if error.status == Some(403) {
            blockers.push(format!("Permission denied for {}", error.step));
        }
    }

    blockers
}

fn generate_notes(project: &ProjectState) -> Vec<String> {
    let mut notes = Vec::new();

    if project.archived {
        notes.push(
            "Project is archived - consider keeping archived status after migration".to_string(),
        );
    }

    match project.default_branch.as_deref() {
        Some("master") => {
            notes.push("Consider renaming default branch from 'master' to 'main'".to_string());
        }
        Some(branch) if branch != "main" => {
            notes.push(format!("Non-standard default branch: {branch}"));
        }
        _ => {}
    }

    let open_mrs = project.mr_counts.open_floor();
    if open_mrs > 0 {
        notes.push(format!(
            "{open_mrs} open merge requests - consider closing or migrating"
        ));
    }
    let open_issues = project.issue_counts.open_floor();
    if open_issues > 50 {
        notes.push(format!(
            "{open_issues} open issues - large issue backlog to migrate"
        ));
    }

    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeshift_core::{Count, IssueCounts, MrCounts, StepError, Visibility};

    fn project() -> ProjectState {
        let mut p = ProjectState::new(
            1,
            "acme/api",
            Some("main".to_string()),
            false,
            Visibility::Private,
            1,
        );
        p.has_ci = Detection::No;
        p.has_lfs = Detection::No;
        p.mr_counts = MrCounts::Known {
            open: Count::Exact(0),
            merged: Count::Exact(0),
            closed: Count::Exact(0),
            total: Count::Exact(0),
        };
        p.issue_counts = IssueCounts::Known {
            open: Count::Exact(0),
            closed: Count::Exact(0),
            total: Count::Exact(0),
        };
        p
    }

    #[test]
    fn tiny_private_project_is_low_complexity() {
        let readiness = compute_readiness(&project());
        assert_eq!(readiness.complexity, Complexity::Low);
        assert!(readiness.blockers.is_empty());
        assert!(readiness.notes.is_empty());
    }

    #[test]
    fn archived_overrides_everything_to_low() {
        let mut p = project();
        p.archived = true;
        p.has_lfs = Detection::Yes;
        p.mr_counts = MrCounts::Known {
            open: Count::Exact(0),
            merged: Count::Exact(500),
            closed: Count::Exact(0),
            total: Count::Exact(500),
        };
        p.issue_counts = IssueCounts::Known {
            open: Count::Exact(0),
            closed: Count::Exact(1500),
            total: Count::Exact(1500),
        };
        let readiness = compute_readiness(&p);
        assert_eq!(readiness.complexity, Complexity::Low);
        assert!(readiness.blockers.iter().any(|b| b.contains("Uses Git LFS")));
        assert!(readiness.notes.iter().any(|n| n.contains("archived")));
    }

    #[test]
    fn ci_and_lfs_push_complexity_up() {
        let mut p = project();
        p.has_ci = Detection::Yes;
        p.has_lfs = Detection::Yes;
        assert_eq!(compute_readiness(&p).complexity, Complexity::High);
    }

    #[test]
    fn internal_visibility_is_a_blocker() {
        let mut p = project();
        p.visibility = Visibility::Internal;
        assert!(compute_readiness(&p)
            .blockers
            .iter()
            .any(|b| b.contains("Internal visibility")));
    }

    #[test]
    fn forbidden_steps_become_blockers() {
        let mut p = project();
        p.add_error(StepError::new("detect_ci", "forbidden", Some(403)));
        assert!(compute_readiness(&p)
            .blockers
            .iter()
            .any(|b| b == "Permission denied for detect_ci"));
    }

    #[test]
    fn master_branch_gets_a_rename_note() {
        let mut p = project();
        p.default_branch = Some("master".to_string());
        assert!(compute_readiness(&p)
            .notes
            .iter()
            .any(|n| n.contains("renaming default branch")));
    }
}
