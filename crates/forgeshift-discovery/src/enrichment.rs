//! Deep-mode enrichment records and risk ranking

use crate::state::ProjectState;
use forgeshift_core::{Count, Detection};
use serde::{Deserialize, Serialize};

/// What the token could actually read during enrichment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub can_read_repo: bool,
    pub can_read_ci: bool,
    pub can_read_protected_branches: bool,
    pub can_read_variables: bool,
    pub can_read_webhooks: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryIntegration {
    pub enabled: bool,
    pub has_images: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PagesIntegration {
    pub enabled: bool,
    pub has_pages_job: bool,
    pub has_public_folder: Detection,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedBranchesIntegration {
    pub count: Count,
    pub has_codeowners: Detection,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariablesIntegration {
    pub project_count: Count,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhooksIntegration {
    pub count: Count,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleasesIntegration {
    pub releases_count: Count,
    pub tags_count: Count,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Integrations {
    pub registry: RegistryIntegration,
    pub pages: PagesIntegration,
    pub protected_branches: ProtectedBranchesIntegration,
    pub variables: VariablesIntegration,
    pub webhooks: WebhooksIntegration,
    pub releases: ReleasesIntegration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    pub complex_ci: bool,
    pub self_hosted_runner_hints: bool,
    pub big_mr_backlog: bool,
    pub big_issue_backlog: bool,
    pub exceeded_limits: bool,
    pub missing_default_branch: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentProfile {
    pub permissions: Permissions,
    pub integrations: Integrations,
    pub risk_flags: RiskFlags,
}

/// Ranking score for deep-analysis ordering: higher means the project
/// gets analyzed earlier. Rewards CI, large backlogs, a missing default
/// branch, and active (non-archived) projects.
pub fn risk_rank_score(project: &ProjectState) -> i64 {
    let mut score: i64 = 0;

    match project.has_ci {
        Detection::Yes => score += 30,
        Detection::Unknown => score += 10,
        Detection::No => {}
    }

    let mr_total = project.mr_counts.total_floor();
    if project.mr_counts.is_truncated() || mr_total > 100 {
        score += 15;
    } else if mr_total > 20 {
        score += 5;
    }

    let issue_total = project.issue_counts.total_floor();
    if project.issue_counts.is_truncated() || issue_total > 500 {
        score += 15;
    } else if issue_total > 100 {
        score += 5;
    }

    if project.default_branch.is_none() {
        score += 10;
    }
    if !project.archived {
        score += 20;
    }

    score
}

/// Risk flags derived from backlog counts and branch state; the CI
/// flags are filled in by the analyzer once the CI sample is parsed.
pub fn backlog_risk_flags(project: &ProjectState) -> RiskFlags {
    let mut flags = RiskFlags::default();

    if project.mr_counts.is_truncated() {
        flags.exceeded_limits = true;
    }
    if project.mr_counts.open_floor() > 20 || project.mr_counts.total_floor() > 500 {
        flags.big_mr_backlog = true;
    }

    if project.issue_counts.is_truncated() {
        flags.exceeded_limits = true;
    }
    if project.issue_counts.open_floor() > 100 || project.issue_counts.total_floor() > 1000 {
        flags.big_issue_backlog = true;
    }

    if project.default_branch.is_none() {
        flags.missing_default_branch = true;
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeshift_core::{IssueCounts, MrCounts, Visibility};

    fn base_project() -> ProjectState {
        ProjectState::new(1, "g/p", Some("main".to_string()), false, Visibility::Private, 1)
    }

    #[test]
    fn ci_and_backlogs_raise_the_rank() {
        let mut quiet = base_project();
        quiet.has_ci = Detection::No;
        let mut busy = base_project();
        busy.has_ci = Detection::Yes;
        busy.mr_counts = MrCounts::Known {
            open: Count::Exact(50),
            merged: Count::Exact(300),
            closed: Count::Exact(10),
            total: Count::Exact(360),
        };
        assert!(risk_rank_score(&busy) > risk_rank_score(&quiet));
    }

    #[test]
    fn archived_projects_rank_lower() {
        let active = base_project();
        let mut archived = base_project();
        archived.archived = true;
        assert!(risk_rank_score(&active) > risk_rank_score(&archived));
    }

    #[test]
    fn truncated_counts_set_exceeded_limits() {
        let mut project = base_project();
        project.issue_counts = IssueCounts::Known {
            open: Count::Exact(10),
            closed: Count::AtLeast(1000),
            total: Count::AtLeast(1010),
        };
        let flags = backlog_risk_flags(&project);
        assert!(flags.exceeded_limits);
        assert!(flags.big_issue_backlog);
        assert!(!flags.big_mr_backlog);
    }
}
