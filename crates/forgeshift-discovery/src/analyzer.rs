//! Parallel deep analysis: enrichment and hour estimation
//!
//! The serial discovery loop hands over here for deep mode. Projects
//! are ranked by risk, the top N are analyzed by a bounded worker
//! pool, and the only shared mutable state is the API budget counter.

use crate::ci_parser::{ci_complexity_score, parse_ci_content};
use crate::enrichment::{
    backlog_risk_flags, risk_rank_score, EnrichmentProfile, Integrations, Permissions,
};
use crate::estimator::{ai_full_project_estimate, apply_ai_estimate, ProjectPromptData};
use crate::scoring::{calculate_migration_hours, CiProfileReport, RepoProfile, ScoringInputs};
use crate::state::{AgentState, ProjectState};
use crate::tools::GitLabTools;
use forgeshift_core::{Count, Detection, StepError};
use forgeshift_llm::ChatProvider;
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_CI_SAMPLE_LINES: usize = 400;

/// Global budget shared by analysis workers. Mirrors the serial
/// counter: registration past the ceiling flips the exceeded flag and
/// in-flight work may land one past.
pub struct SharedBudget {
    total: AtomicU64,
    max: u64,
    exceeded: AtomicBool,
}

impl SharedBudget {
    pub fn new(current_total: u64, max: u64, exceeded: bool) -> Self {
        Self {
            total: AtomicU64::new(current_total),
            max,
            exceeded: AtomicBool::new(exceeded),
        }
    }

    pub fn register(&self) -> bool {
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        if total >= self.max {
            self.exceeded.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn is_exceeded(&self) -> bool {
        self.exceeded.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DeepAnalysisOptions {
    /// Analyze only the N riskiest projects; 0 means all.
    pub top_n: usize,
    pub workers: usize,
}

pub struct DeepAnalyzer {
    tools: Arc<GitLabTools>,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl DeepAnalyzer {
    pub fn new(tools: Arc<GitLabTools>, provider: Option<Arc<dyn ChatProvider>>) -> Self {
        Self { tools, provider }
    }

    /// Run deep analysis over the state's projects. Each worker owns
    /// its project entry for the duration; results are merged back.
    pub async fn run(
        &self,
        state: &mut AgentState,
        options: DeepAnalysisOptions,
        cancel: &CancellationToken,
    ) {
        let mut ranked: Vec<u64> = state.projects.keys().copied().collect();
        ranked.sort_by_key(|id| std::cmp::Reverse(risk_rank_score(&state.projects[id])));
        if options.top_n > 0 {
            ranked.truncate(options.top_n);
        }

        let total = ranked.len();
        let workers = options.workers.max(1);
        info!(projects = total, workers, "starting deep analysis");

        let budget = Arc::new(SharedBudget::new(
            state.total_api_calls,
            state.max_api_calls,
            state.budget_exceeded,
        ));

        let selected: Vec<ProjectState> = ranked
            .iter()
            .filter_map(|id| state.projects.remove(id))
            .collect();

        let analyzed: Vec<ProjectState> = futures::stream::iter(selected.into_iter().map(|p| {
            let tools = self.tools.clone();
            let provider = self.provider.clone();
            let budget = budget.clone();
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() || budget.is_exceeded() {
                    // Pending work is dropped, not failed.
                    return p;
                }
                analyze_project(&tools, &budget, provider.as_deref(), p).await
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;

        let mut done = 0usize;
        for project in analyzed {
            done += 1;
            if done % 10 == 0 || done == total {
                info!(done, total, "deep analysis progress");
            }
            state.projects.insert(project.id, project);
        }

        state.total_api_calls = budget.total();
        state.budget_exceeded = state.budget_exceeded || budget.is_exceeded();
        if state.budget_exceeded {
            warn!("budget exceeded during deep analysis");
        }
        info!("deep analysis complete");
    }
}

/// Enrich one project and compute its estimate. Probe failures map to
/// unknown values; permission refusals additionally clear the matching
/// permission flag.
async fn analyze_project(
    tools: &GitLabTools,
    budget: &SharedBudget,
    provider: Option<&dyn ChatProvider>,
    mut project: ProjectState,
) -> ProjectState {
    let project_id = project.id;
    let git_ref = project.default_branch.clone();
    let git_ref = git_ref.as_deref();

    let mut permissions = Permissions::default();
    let mut integrations = Integrations::default();
    let mut risk_flags = backlog_risk_flags(&project);

    // --- Repository profile ---
    let mut repo_profile = RepoProfile {
        branches_count: Count::Unknown,
        tags_count: Count::Unknown,
        has_submodules: Detection::Unknown,
        has_lfs: project.has_lfs,
    };

    let branches = tools.branches_count(project_id).await;
    budget.register();
    match branches {
        Ok(count) => {
            repo_profile.branches_count = count;
            permissions.can_read_repo = true;
        }
        Err(e) => record_permission_error(&mut project, e),
    }

    let tags = tools.tags_count(project_id).await;
    budget.register();
    if let Ok(count) = tags {
        repo_profile.tags_count = count;
        integrations.releases.tags_count = count;
    }

    let (submodules, _) = tools.detect_submodules(project_id, git_ref).await;
    budget.register();
    repo_profile.has_submodules = submodules;

    // --- CI profile ---
    let mut ci_profile = CiProfileReport {
        present: project.has_ci.is_yes(),
        ..Default::default()
    };
    let mut ci_score = 0u32;
    let mut ci_factors: Vec<String> = Vec::new();
    let mut ci_content_raw = String::new();

    if project.has_ci.is_yes() {
        let sample = tools
            .ci_content(project_id, git_ref, DEFAULT_CI_SAMPLE_LINES)
            .await;
        budget.register();

        if let Ok(Some(sample)) = sample {
            permissions.can_read_ci = true;
            ci_content_raw = sample.content.clone();

            let parsed = parse_ci_content(&sample.content);
            ci_profile.total_lines = sample.total_lines;
            ci_profile.features = parsed.features;
            ci_profile.runner_hints = parsed.runner_hints;
            ci_profile.job_count = parsed.job_count;
            ci_profile.include_count = parsed.include_count;

            let (score, factors) = ci_complexity_score(&parsed);
            ci_score = score;
            ci_factors = factors;

            if ci_score > 30 {
                risk_flags.complex_ci = true;
            }
            if parsed.runner_hints.uses_tags || parsed.runner_hints.possible_self_hosted {
                risk_flags.self_hosted_runner_hints = true;
            }
            if parsed.features.environments || sample.content.to_ascii_lowercase().contains("pages")
            {
                integrations.pages.has_pages_job = true;
            }
        }
    }

    // --- Integrations ---
    let protected = tools.protected_branches_count(project_id).await;
    budget.register();
    match protected {
        Ok(count) => {
            integrations.protected_branches.count = count;
            permissions.can_read_protected_branches = true;
        }
        Err(e) => record_permission_error(&mut project, e),
    }

    let (codeowners, _) = tools.detect_codeowners(project_id, git_ref).await;
    budget.register();
    integrations.protected_branches.has_codeowners = codeowners;

    let variables = tools.project_variables_count(project_id).await;
    budget.register();
    match variables {
        Ok(count) => {
            integrations.variables.project_count = count;
            permissions.can_read_variables = true;
        }
        Err(e) => record_permission_error(&mut project, e),
    }

    let webhooks = tools.webhooks_count(project_id).await;
    budget.register();
    match webhooks {
        Ok(count) => {
            integrations.webhooks.count = count;
            permissions.can_read_webhooks = true;
        }
        Err(e) => record_permission_error(&mut project, e),
    }

    let releases = tools.releases_count(project_id).await;
    budget.register();
    if let Ok(count) = releases {
        integrations.releases.releases_count = count;
    }

    let container = tools.detect_container_files(project_id, git_ref).await;
    budget.register();
    if let Ok(hints) = container {
        if hints.has_dockerfile.is_yes() {
            integrations.registry.has_images = true;
        }
    }

    let (public_folder, _) = tools.detect_public_folder(project_id, git_ref).await;
    budget.register();
    integrations.pages.has_public_folder = public_folder;

    let features = tools.project_features(project_id).await;
    budget.register();
    if let Ok(features) = features {
        integrations.registry.enabled = features.container_registry_enabled;
        integrations.pages.enabled = features.pages_access_level != "disabled";
        project.wiki_enabled = features.wiki_enabled;
    }

    // --- Estimate ---
    let mut estimate = calculate_migration_hours(&ScoringInputs {
        repo_profile: &repo_profile,
        ci_score,
        ci_factors: &ci_factors,
        runner_hints: &ci_profile.runner_hints,
        mr_counts: &project.mr_counts,
        issue_counts: &project.issue_counts,
        integrations: &integrations,
        archived: project.archived,
        wiki_enabled: project.wiki_enabled,
    });

    if let Some(provider) = provider {
        let repo_value = serde_json::to_value(&repo_profile).unwrap_or_default();
        let mr_value = serde_json::to_value(&project.mr_counts).unwrap_or_default();
        let issue_value = serde_json::to_value(&project.issue_counts).unwrap_or_default();
        let integrations_value = serde_json::to_value(&integrations).unwrap_or_default();
        let ci_profile_value = serde_json::to_value(&ci_profile).unwrap_or_default();
        let prompt_data = ProjectPromptData {
            name: &project.path_with_namespace,
            archived: project.archived,
            default_branch: project.default_branch.as_deref(),
            repo_profile: &repo_value,
            mr_counts: &mr_value,
            issue_counts: &issue_value,
            integrations: &integrations_value,
            ci_content: &ci_content_raw,
            ci_profile: &ci_profile_value,
        };
        if let Some(ai) = ai_full_project_estimate(provider, &prompt_data).await {
            apply_ai_estimate(&mut estimate, &ai);
            ci_profile.ai_analysis = Some(json!({
                "hours_low": ai.hours_low,
                "hours_high": ai.hours_high,
                "risk": ai.risk,
                "supported": ai.supported,
                "not_supported": ai.not_supported,
            }));
        }
    }

    project.repo_profile = Some(repo_profile);
    project.ci_profile = Some(ci_profile);
    project.enrichment = Some(EnrichmentProfile {
        permissions,
        integrations,
        risk_flags,
    });
    project.estimate = Some(estimate);
    project
}

fn record_permission_error(project: &mut ProjectState, error: StepError) {
    if error.status == Some(403) {
        project.add_error(error);
    }
}
