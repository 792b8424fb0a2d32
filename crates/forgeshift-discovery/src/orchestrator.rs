//! Discovery workflow controller
//!
//! Wires the client, planner, executor, and deep analyzer together,
//! then builds, validates, and writes the inventory plus a plain-text
//! summary. Outputs are always written, even on a failed run, so a
//! rerun can resume from whatever was reached.

use crate::analyzer::{DeepAnalysisOptions, DeepAnalyzer};
use crate::config::{DiscoveryConfig, ScanMode};
use crate::executor::Executor;
use crate::inventory::{build_inventory, Inventory};
use crate::planner::{next_action, Action};
use crate::schema::validate_inventory;
use crate::state::AgentState;
use crate::tools::GitLabTools;
use forgeshift_client::{ClientOptions, GitLabClient};
use forgeshift_core::util::{now_iso, write_json_atomic};
use forgeshift_core::{Error, Result};
use forgeshift_llm::{AzureOpenAiProvider, ChatProvider};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct DiscoveryOrchestrator {
    config: DiscoveryConfig,
    cancel: CancellationToken,
}

impl DiscoveryOrchestrator {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run discovery end to end and return the inventory.
    pub async fn run(&self) -> Result<Inventory> {
        let started_at = now_iso();
        let mode = self.config.scan_mode();
        match &mode {
            ScanMode::SingleProject(path) => {
                info!(project = %path, base_url = %self.config.base_url, "starting discovery")
            }
            ScanMode::RootGroup(group) => {
                info!(group = %group, base_url = %self.config.base_url, "starting discovery")
            }
            ScanMode::DiscoverAll => {
                info!(base_url = %self.config.base_url, "starting discovery for all accessible groups")
            }
        }
        info!(
            max_api_calls = self.config.max_api_calls,
            max_per_project_calls = self.config.max_per_project_calls,
            "budget"
        );

        let client = Arc::new(GitLabClient::new(
            &self.config.base_url,
            &self.config.token,
            ClientOptions {
                timeout_secs: self.config.timeout_secs,
                verify_ssl: self.config.verify_ssl,
                ..ClientOptions::default()
            },
        )?);
        let tools = Arc::new(GitLabTools::new(client));

        let mut state = AgentState::new(
            mode.clone(),
            self.config.max_api_calls,
            self.config.max_per_project_calls,
        );

        self.run_discovery_loop(&tools, &mut state).await;

        if self.config.deep && !self.cancel.is_cancelled() {
            let provider = self.llm_provider();
            let analyzer = DeepAnalyzer::new(tools.clone(), provider);
            analyzer
                .run(
                    &mut state,
                    DeepAnalysisOptions {
                        top_n: self.config.deep_top_n,
                        workers: self.config.parallel_workers,
                    },
                    &self.cancel,
                )
                .await;
        }

        let root_group_label = match &mode {
            ScanMode::SingleProject(path) => format!("PROJECT:{path}"),
            ScanMode::RootGroup(group) => group.clone(),
            ScanMode::DiscoverAll => "ALL_ACCESSIBLE_GROUPS".to_string(),
        };
        let inventory = build_inventory(
            &state,
            started_at,
            now_iso(),
            self.config.base_url.clone(),
            root_group_label,
        );

        // Outputs are written at whatever completeness was reached,
        // before validation gets a chance to reject the run.
        self.save_outputs(&inventory)?;

        if let Err(errors) = validate_inventory(&inventory) {
            error!(count = errors.len(), "inventory failed validation");
            for message in &errors {
                error!(violation = %message);
            }
            return Err(Error::validation(format!(
                "inventory failed validation with {} violations",
                errors.len()
            )));
        }
        info!("inventory validated");

        Ok(inventory)
    }

    async fn run_discovery_loop(&self, tools: &GitLabTools, state: &mut AgentState) {
        let executor = Executor::new(tools);
        // Safety ceiling against pathological planner cycles.
        let max_iterations = self.config.max_api_calls.saturating_mul(2);
        let mut iteration: u64 = 0;

        while iteration < max_iterations {
            iteration += 1;

            if self.cancel.is_cancelled() {
                warn!("discovery cancelled");
                break;
            }

            let action = next_action(state);
            if action == Action::Done {
                info!("discovery complete");
                break;
            }

            let success = executor.execute(state, &action).await;
            if !success {
                warn!(?action, "action failed");
            }

            if state.budget_exceeded {
                warn!("api budget exceeded, stopping discovery");
                break;
            }
        }

        if iteration >= max_iterations {
            error!("maximum iterations exceeded, stopping discovery");
        }
        info!(
            iterations = iteration,
            api_calls = state.total_api_calls,
            "discovery loop finished"
        );
    }

    fn llm_provider(&self) -> Option<Arc<dyn ChatProvider>> {
        if !self.config.ai_enabled {
            return None;
        }
        if !self.config.llm.is_configured() {
            warn!("model analysis requested but the provider is not configured");
            return None;
        }
        info!("model-assisted estimation enabled");
        Some(Arc::new(AzureOpenAiProvider::new(self.config.llm.clone())))
    }

    fn save_outputs(&self, inventory: &Inventory) -> Result<()> {
        let output_dir = Path::new(&self.config.output_dir);
        let inventory_path = output_dir.join("inventory.json");
        write_json_atomic(&inventory_path, inventory)?;
        info!(path = %inventory_path.display(), "inventory saved");

        let summary_path = output_dir.join("summary.txt");
        std::fs::write(&summary_path, generate_summary(inventory))?;
        info!(path = %summary_path.display(), "summary saved");
        Ok(())
    }
}

/// Human-readable run summary written next to the inventory.
pub fn generate_summary(inventory: &Inventory) -> String {
    let stats = &inventory.run.stats;
    let projects = &inventory.projects;

    let mut low = 0u64;
    let mut medium = 0u64;
    let mut high = 0u64;
    for project in projects {
        match project.readiness.complexity {
            crate::readiness::Complexity::Low => low += 1,
            crate::readiness::Complexity::Medium => medium += 1,
            crate::readiness::Complexity::High => high += 1,
        }
    }
    let with_blockers = projects
        .iter()
        .filter(|p| !p.readiness.blockers.is_empty())
        .count();
    let with_ci = projects.iter().filter(|p| p.facts.has_ci.is_yes()).count();
    let with_lfs = projects.iter().filter(|p| p.facts.has_lfs.is_yes()).count();
    let archived = projects.iter().filter(|p| p.archived).count();

    let mut lines = vec![
        "DISCOVERY SUMMARY".to_string(),
        format!("Base URL: {}", inventory.run.base_url),
        format!("Root Group: {}", inventory.run.root_group),
        format!("Started: {}", inventory.run.started_at),
        format!("Finished: {}", inventory.run.finished_at),
        String::new(),
        "STATISTICS".to_string(),
        format!("  Groups: {}", stats.groups),
        format!("  Projects: {}", stats.projects),
        format!("  API Calls: {}", stats.api_calls),
        format!("  Errors: {}", stats.errors),
        String::new(),
        "PROJECT BREAKDOWN".to_string(),
        format!("  Complexity - Low: {low}, Medium: {medium}, High: {high}"),
        format!("  With CI/CD: {with_ci}"),
        format!("  With LFS: {with_lfs}"),
        format!("  Archived: {archived}"),
        format!("  With Blockers: {with_blockers}"),
    ];

    let with_estimates: Vec<_> = projects.iter().filter(|p| p.estimate.is_some()).collect();
    if !with_estimates.is_empty() {
        let total_low: f64 = with_estimates
            .iter()
            .filter_map(|p| p.estimate.as_ref())
            .map(|e| e.hours_low)
            .sum();
        let total_high: f64 = with_estimates
            .iter()
            .filter_map(|p| p.estimate.as_ref())
            .map(|e| e.hours_high)
            .sum();

        lines.push(String::new());
        lines.push("HOURS ESTIMATES".to_string());
        lines.push(format!(
            "  Projects with estimates: {}",
            with_estimates.len()
        ));
        lines.push(format!(
            "  Total Hours (range): {total_low:.1}h - {total_high:.1}h"
        ));

        let mut by_effort = with_estimates.clone();
        by_effort.sort_by(|a, b| {
            let ah = a.estimate.as_ref().map(|e| e.hours_high).unwrap_or(0.0);
            let bh = b.estimate.as_ref().map(|e| e.hours_high).unwrap_or(0.0);
            bh.partial_cmp(&ah).unwrap_or(std::cmp::Ordering::Equal)
        });
        lines.push(String::new());
        lines.push("  Top 5 Highest Effort (by hours):".to_string());
        for project in by_effort.iter().take(5) {
            let estimate = project.estimate.as_ref().expect("filtered above");
            lines.push(format!(
                "    - {}: {}-{}h (confidence: {})",
                project.path_with_namespace,
                estimate.hours_low,
                estimate.hours_high,
                serde_json::to_value(estimate.confidence)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default(),
            ));
        }

        let mut blockers: Vec<String> = Vec::new();
        for project in &with_estimates {
            for blocker in &project.estimate.as_ref().expect("filtered above").blockers {
                if !blockers.contains(blocker) {
                    blockers.push(blocker.clone());
                }
            }
        }
        if !blockers.is_empty() {
            lines.push(String::new());
            lines.push("  Common Blockers:".to_string());
            for blocker in blockers.iter().take(5) {
                lines.push(format!("    ! {blocker}"));
            }
        }
    }

    lines.join("\n")
}
