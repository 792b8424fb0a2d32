//! Deterministic migration effort scoring
//!
//! Produces a work score in [0, 100], a coarse S/M/L/XL bucket, and an
//! hour range with additive adjustments. Always present; the optional
//! LLM estimate only ever replaces the numbers, never this code path.

use crate::ci_parser::{CiFeatures, RunnerHints};
use crate::enrichment::Integrations;
use forgeshift_core::{Count, Detection, IssueCounts, MrCounts};
use serde::{Deserialize, Serialize};

pub const BUCKET_M_THRESHOLD: u32 = 20;
pub const BUCKET_L_THRESHOLD: u32 = 45;
pub const BUCKET_XL_THRESHOLD: u32 = 70;

/// Repository shape collected during deep analysis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoProfile {
    pub branches_count: Count,
    pub tags_count: Count,
    pub has_submodules: Detection,
    pub has_lfs: Detection,
}

/// Parsed CI profile as it appears in the inventory.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CiProfileReport {
    pub present: bool,
    pub total_lines: usize,
    pub features: CiFeatures,
    pub runner_hints: RunnerHints,
    pub job_count: usize,
    pub include_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    S,
    M,
    L,
    XL,
}

impl Bucket {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= BUCKET_XL_THRESHOLD => Self::XL,
            s if s >= BUCKET_L_THRESHOLD => Self::L,
            s if s >= BUCKET_M_THRESHOLD => Self::M,
            _ => Self::S,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// What the estimate covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFlags {
    pub code: bool,
    pub ci: bool,
    pub merge_requests: bool,
    pub issues: bool,
    pub wiki: bool,
    pub releases: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakdownPart {
    pub hours_low: f64,
    pub hours_high: f64,
    pub notes: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub code: BreakdownPart,
    pub mrs: BreakdownPart,
    pub issues: BreakdownPart,
    pub ci: BreakdownPart,
}

impl Breakdown {
    pub fn total_low(&self) -> f64 {
        self.code.hours_low + self.mrs.hours_low + self.issues.hours_low + self.ci.hours_low
    }

    pub fn total_high(&self) -> f64 {
        self.code.hours_high + self.mrs.hours_high + self.issues.hours_high + self.ci.hours_high
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationEstimate {
    pub work_score: u32,
    pub bucket: Bucket,
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

pub struct ScoringInputs<'a> {
    pub repo_profile: &'a RepoProfile,
    pub ci_score: u32,
    pub ci_factors: &'a [String],
    pub runner_hints: &'a RunnerHints,
    pub mr_counts: &'a MrCounts,
    pub issue_counts: &'a IssueCounts,
    pub integrations: &'a Integrations,
    pub archived: bool,
    pub wiki_enabled: bool,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rule-based hour estimation from the enrichment data.
pub fn calculate_migration_hours(inputs: &ScoringInputs) -> MigrationEstimate {
    let mut score = inputs.ci_score.min(50);
    let mut drivers: Vec<String> = inputs.ci_factors.to_vec();
    let mut blockers: Vec<String> = Vec::new();
    let mut unknowns: Vec<String> = Vec::new();

    let repo = inputs.repo_profile;

    // Repository contribution.
    match repo.branches_count {
        Count::Exact(n) | Count::AtLeast(n) if n > 20 => {
            score += 5;
            drivers.push(format!("Many branches ({n}+)"));
        }
        Count::Exact(n) | Count::AtLeast(n) if n > 5 => score += 2,
        Count::Unknown => unknowns.push("branches_count".to_string()),
        _ => {}
    }
    match repo.tags_count {
        Count::Exact(n) | Count::AtLeast(n) if n > 50 => {
            score += 3;
            drivers.push(format!("Many tags ({n}+)"));
        }
        Count::Unknown => unknowns.push("tags_count".to_string()),
        _ => {}
    }
    match repo.has_submodules {
        Detection::Yes => {
            score += 8;
            drivers.push("Uses git submodules".to_string());
        }
        Detection::Unknown => unknowns.push("has_submodules".to_string()),
        Detection::No => {}
    }
    match repo.has_lfs {
        Detection::Yes => {
            score += 8;
            drivers.push("Uses Git LFS".to_string());
            blockers.push("Git LFS migration required".to_string());
        }
        Detection::Unknown => unknowns.push("has_lfs".to_string()),
        Detection::No => {}
    }

    // Backlog contribution.
    let mr_total = inputs.mr_counts.total_floor();
    let big_mr_backlog = inputs.mr_counts.is_truncated() || mr_total > 500;
    match inputs.mr_counts {
        MrCounts::Unknown(_) => unknowns.push("mr_counts".to_string()),
        MrCounts::Known { .. } => {
            if big_mr_backlog {
                score += 10;
                drivers.push(format!("Large MR history ({mr_total}+)"));
            } else if mr_total > 100 {
                score += 6;
            } else if mr_total > 20 {
                score += 3;
            }
        }
    }
    let issue_total = inputs.issue_counts.total_floor();
    let big_issue_backlog = inputs.issue_counts.is_truncated() || issue_total > 1000;
    match inputs.issue_counts {
        IssueCounts::Unknown(_) => unknowns.push("issue_counts".to_string()),
        IssueCounts::Known { .. } => {
            if big_issue_backlog {
                score += 8;
                drivers.push(format!("Large issue backlog ({issue_total}+)"));
            } else if issue_total > 500 {
                score += 5;
            } else if issue_total > 100 {
                score += 2;
            }
        }
    }

    // Integration contribution.
    let integrations = inputs.integrations;
    let protected = integrations.protected_branches.count.floor();
    if protected > 1 {
        score += 3;
        drivers.push(format!("{protected} protected branches"));
    }
    let variables = integrations.variables.project_count.floor();
    if variables > 10 {
        score += 3;
        drivers.push(format!("{variables} CI variables to recreate"));
    } else if variables > 0 {
        score += 1;
    }
    if integrations.webhooks.count.floor() > 0 {
        score += 2;
    }
    let releases = integrations.releases.releases_count.floor();
    if releases > 20 {
        score += 4;
        drivers.push(format!("{releases} releases"));
    } else if releases > 0 {
        score += 2;
    }
    if integrations.pages.enabled {
        score += 3;
        drivers.push("Pages site in use".to_string());
    }
    if integrations.registry.enabled {
        score += 3;
        blockers.push("Container images are not migrated automatically".to_string());
    }

    let work_score = score.min(100);

    // Hour range from the score, plus additive adjustments.
    let mut hours_low = 1.0 + 0.25 * work_score as f64;
    let mut hours_high = 2.0 + 0.5 * work_score as f64;

    if repo.has_submodules.is_yes() {
        hours_low += 2.0;
        hours_high += 4.0;
    }
    if repo.has_lfs.is_yes() {
        hours_low += 2.0;
        hours_high += 4.0;
    }
    if inputs.runner_hints.possible_self_hosted {
        hours_low += 3.0;
        hours_high += 6.0;
        blockers.push("Self-hosted runner setup likely required".to_string());
    }
    if protected > 1 {
        hours_low += 1.0;
        hours_high += 2.0;
    }
    if big_mr_backlog {
        hours_low += 2.0;
        hours_high += 6.0;
    }
    if big_issue_backlog {
        hours_low += 2.0;
        hours_high += 8.0;
    }

    // Archived projects are frozen: half the work, floor of one hour.
    if inputs.archived {
        hours_low = (hours_low * 0.5).max(1.0);
        hours_high = (hours_high * 0.5).max(1.0);
        drivers.push("Archived project (reduced scope)".to_string());
    }

    let confidence = if unknowns.is_empty() && work_score < BUCKET_L_THRESHOLD {
        Confidence::High
    } else if unknowns.len() <= 2 && work_score < BUCKET_XL_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    MigrationEstimate {
        work_score,
        bucket: Bucket::from_score(work_score),
        hours_low: round1(hours_low),
        hours_high: round1(hours_high.max(hours_low)),
        confidence,
        drivers,
        blockers,
        unknowns,
        scope_flags: ScopeFlags {
            code: true,
            ci: inputs.ci_score > 0,
            merge_requests: inputs.mr_counts.open_floor() > 0,
            issues: inputs.issue_counts.open_floor() > 0,
            wiki: inputs.wiki_enabled,
            releases: releases > 0,
        },
        breakdown: None,
        critical_notes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeshift_core::Count;

    fn empty_inputs<'a>(
        repo: &'a RepoProfile,
        hints: &'a RunnerHints,
        mrs: &'a MrCounts,
        issues: &'a IssueCounts,
        integrations: &'a Integrations,
    ) -> ScoringInputs<'a> {
        ScoringInputs {
            repo_profile: repo,
            ci_score: 0,
            ci_factors: &[],
            runner_hints: hints,
            mr_counts: mrs,
            issue_counts: issues,
            integrations,
            archived: false,
            wiki_enabled: false,
        }
    }

    fn tiny_repo() -> RepoProfile {
        RepoProfile {
            branches_count: Count::Exact(1),
            tags_count: Count::Exact(0),
            has_submodules: Detection::No,
            has_lfs: Detection::No,
        }
    }

    fn zero_mrs() -> MrCounts {
        MrCounts::Known {
            open: Count::Exact(0),
            merged: Count::Exact(0),
            closed: Count::Exact(0),
            total: Count::Exact(0),
        }
    }

    fn zero_issues() -> IssueCounts {
        IssueCounts::Known {
            open: Count::Exact(0),
            closed: Count::Exact(0),
            total: Count::Exact(0),
        }
    }

    #[test]
    fn tiny_project_is_one_to_two_hours_high_confidence() {
        let repo = tiny_repo();
        let hints = RunnerHints::default();
        let mrs = zero_mrs();
        let issues = zero_issues();
        let integrations = Integrations::default();
        let estimate =
            calculate_migration_hours(&empty_inputs(&repo, &hints, &mrs, &issues, &integrations));

        assert_eq!(estimate.work_score, 0);
        assert_eq!(estimate.bucket, Bucket::S);
        assert_eq!(estimate.hours_low, 1.0);
        assert_eq!(estimate.hours_high, 2.0);
        assert_eq!(estimate.confidence, Confidence::High);
        assert!(estimate.unknowns.is_empty());
    }

    #[test]
    fn ci_heavy_project_lands_over_twenty_hours() {
        let repo = tiny_repo();
        let hints = RunnerHints {
            uses_tags: true,
            possible_self_hosted: true,
            docker_in_docker: true,
            privileged: false,
        };
        let mrs = zero_mrs();
        let issues = zero_issues();
        let integrations = Integrations::default();
        let mut inputs = empty_inputs(&repo, &hints, &mrs, &issues, &integrations);
        inputs.ci_score = 41;

        let estimate = calculate_migration_hours(&inputs);
        assert!(estimate.hours_high >= 20.0, "got {}", estimate.hours_high);
        assert!(estimate.hours_low <= estimate.hours_high);
        assert!(estimate
            .blockers
            .iter()
            .any(|b| b.contains("Self-hosted runner")));
    }

    #[test]
    fn archived_projects_are_halved_with_a_floor() {
        let repo = tiny_repo();
        let hints = RunnerHints::default();
        let mrs = zero_mrs();
        let issues = zero_issues();
        let integrations = Integrations::default();
        let mut inputs = empty_inputs(&repo, &hints, &mrs, &issues, &integrations);
        inputs.archived = true;

        let estimate = calculate_migration_hours(&inputs);
        assert_eq!(estimate.hours_low, 1.0);
        assert_eq!(estimate.hours_high, 1.0);
    }

    #[test]
    fn unknown_facts_lower_confidence() {
        let repo = RepoProfile {
            branches_count: Count::Unknown,
            tags_count: Count::Unknown,
            has_submodules: Detection::Unknown,
            has_lfs: Detection::Unknown,
        };
        let hints = RunnerHints::default();
        let mrs = MrCounts::unknown();
        let issues = IssueCounts::unknown();
        let integrations = Integrations::default();
        let estimate =
            calculate_migration_hours(&empty_inputs(&repo, &hints, &mrs, &issues, &integrations));
        assert_eq!(estimate.confidence, Confidence::Low);
        assert!(estimate.unknowns.len() >= 4);
    }

    #[test]
    fn bucket_thresholds() {
        assert_eq!(Bucket::from_score(0), Bucket::S);
        assert_eq!(Bucket::from_score(19), Bucket::S);
        assert_eq!(Bucket::from_score(20), Bucket::M);
        assert_eq!(Bucket::from_score(44), Bucket::M);
        assert_eq!(Bucket::from_score(45), Bucket::L);
        assert_eq!(Bucket::from_score(69), Bucket::L);
        assert_eq!(Bucket::from_score(70), Bucket::XL);
        assert_eq!(Bucket::from_score(100), Bucket::XL);
    }

    #[test]
    fn scoring_is_deterministic() {
        let repo = tiny_repo();
        let hints = RunnerHints::default();
        let mrs = zero_mrs();
        let issues = zero_issues();
        let integrations = Integrations::default();
        let a =
            calculate_migration_hours(&empty_inputs(&repo, &hints, &mrs, &issues, &integrations));
        let b =
            calculate_migration_hours(&empty_inputs(&repo, &hints, &mrs, &issues, &integrations));
        assert_eq!(a, b);
    }

    #[test]
    fn lfs_and_submodules_add_hours_and_blockers() {
        let repo = RepoProfile {
            branches_count: Count::Exact(1),
            tags_count: Count::Exact(0),
            has_submodules: Detection::Yes,
            has_lfs: Detection::Yes,
        };
        let hints = RunnerHints::default();
        let mrs = zero_mrs();
        let issues = zero_issues();
        let integrations = Integrations::default();
        let estimate =
            calculate_migration_hours(&empty_inputs(&repo, &hints, &mrs, &issues, &integrations));
        // 16 score points plus the +4/+8 hour adjustments.
        assert!(estimate.hours_low > 4.0);
        assert!(estimate.blockers.iter().any(|b| b.contains("LFS")));
    }
}
