//! SOW document generation with chunked project summaries

use crate::metrics::{aggregate_metrics, select_projects, SowMetrics};
use forgeshift_llm::{ChatProvider, ChatRequest};
use serde_json::Value;
use tracing::{info, warn};

/// Character budget per generation call; project tables are chunked
/// to stay inside it.
pub const CHUNK_CHAR_BUDGET: usize = 6_000;

const SOW_SYSTEM_PROMPT: &str = "You write professional statements of work for \
source-forge to destination-forge migration projects. Respond with polished \
Markdown for the requested section only, no preamble.";

#[derive(Clone, Debug, Default)]
pub struct SowOptions {
    pub client_name: String,
    pub hourly_rate: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct SowOutput {
    pub markdown: String,
    pub metrics: SowMetrics,
}

/// Generate a SOW for the selected projects of an inventory.
///
/// With a provider, the summary and scope sections are written by the
/// model (per chunk); without one, a deterministic template produces
/// the same document shape.
pub async fn generate_sow(
    inventory: &Value,
    selected_ids: &[u64],
    options: &SowOptions,
    provider: Option<&dyn ChatProvider>,
) -> SowOutput {
    let projects = select_projects(inventory, selected_ids);
    let metrics = aggregate_metrics(&projects);
    info!(
        projects = metrics.project_count,
        hours_low = metrics.total_hours_low,
        hours_high = metrics.total_hours_high,
        "generating SOW"
    );

    let mut sections: Vec<String> = Vec::new();
    sections.push(header_section(inventory, options, &metrics));

    let chunks = chunk_project_tables(&projects, CHUNK_CHAR_BUDGET);
    if let Some(provider) = provider {
        for (index, chunk) in chunks.iter().enumerate() {
            match llm_scope_section(provider, chunk, index, chunks.len(), &metrics).await {
                Some(section) => sections.push(section),
                None => {
                    warn!(chunk = index + 1, "model section failed, using template");
                    sections.push(template_scope_section(chunk, index, chunks.len()));
                }
            }
        }
    } else {
        for (index, chunk) in chunks.iter().enumerate() {
            sections.push(template_scope_section(chunk, index, chunks.len()));
        }
    }

    sections.push(effort_section(&metrics, options));
    sections.push(assumptions_section(&metrics));

    SowOutput {
        markdown: sections.join("\n\n"),
        metrics,
    }
}

/// One Markdown table row per project; chunked by character budget so
/// a large inventory never overruns a single generation call.
pub fn chunk_project_tables(projects: &[&Value], budget: usize) -> Vec<String> {
    const TABLE_HEADER: &str =
        "| Project | Hours | Confidence | CI | LFS | Blockers |\n|---|---|---|---|---|---|";

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::from(TABLE_HEADER);

    for project in projects {
        let estimate = &project["estimate"];
        let hours = if estimate.is_object() {
            format!(
                "{}-{}h",
                estimate["hours_low"].as_f64().unwrap_or(0.0),
                estimate["hours_high"].as_f64().unwrap_or(0.0)
            )
        } else {
            "n/a".to_string()
        };
        let blockers = project["readiness"]["blockers"]
            .as_array()
            .map(Vec::len)
            .unwrap_or(0);
        let row = format!(
            "\n| {} | {} | {} | {} | {} | {} |",
            project["path_with_namespace"].as_str().unwrap_or("?"),
            hours,
            estimate["confidence"].as_str().unwrap_or("-"),
            if project["facts"]["has_ci"].as_bool() == Some(true) { "yes" } else { "no" },
            if project["facts"]["has_lfs"].as_bool() == Some(true) { "yes" } else { "no" },
            blockers,
        );

        if current.len() + row.len() > budget && current.len() > TABLE_HEADER.len() {
            chunks.push(std::mem::replace(&mut current, TABLE_HEADER.to_string()));
        }
        current.push_str(&row);
    }

    if current.len() > TABLE_HEADER.len() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn llm_scope_section(
    provider: &dyn ChatProvider,
    chunk: &str,
    index: usize,
    total: usize,
    metrics: &SowMetrics,
) -> Option<String> {
    let request = ChatRequest {
        system: SOW_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Write the project scope section (part {} of {total}) for a migration SOW.\n\
             Overall: {} projects, {:.1}-{:.1} estimated hours.\n\
             Projects in this part:\n\n{chunk}\n\n\
             Summarize the work, call out risk drivers, keep it under 300 words.",
            index + 1,
            metrics.project_count,
            metrics.total_hours_low,
            metrics.total_hours_high,
        ),
        ..Default::default()
    };
    provider.complete(request).await.ok()
}

fn header_section(inventory: &Value, options: &SowOptions, metrics: &SowMetrics) -> String {
    let client = if options.client_name.is_empty() {
        "Client"
    } else {
        &options.client_name
    };
    format!(
        "# Statement of Work — Forge Migration\n\n\
         **Client**: {client}\n\
         **Source**: {}\n\
         **Scope root**: {}\n\
         **Prepared**: {}\n\n\
         ## Summary\n\n\
         This engagement migrates {} selected project(s) from the source forge \
         to the destination forge, covering repositories, CI configuration, \
         issues, merge requests, wikis, releases, and settings.",
        inventory["run"]["base_url"].as_str().unwrap_or("-"),
        inventory["run"]["root_group"].as_str().unwrap_or("-"),
        forgeshift_core::util::now_iso(),
        metrics.project_count,
    )
}

fn template_scope_section(chunk: &str, index: usize, total: usize) -> String {
    let suffix = if total > 1 {
        format!(" (part {} of {total})", index + 1)
    } else {
        String::new()
    };
    format!("## Project Scope{suffix}\n\n{chunk}")
}

fn effort_section(metrics: &SowMetrics, options: &SowOptions) -> String {
    let mut lines = vec![
        "## Effort & Pricing".to_string(),
        String::new(),
        format!(
            "- Estimated effort: **{:.1} - {:.1} hours** across {} project(s) with estimates",
            metrics.total_hours_low, metrics.total_hours_high, metrics.with_estimates
        ),
        format!(
            "- Size distribution: S={}, M={}, L={}, XL={}",
            metrics.buckets.s, metrics.buckets.m, metrics.buckets.l, metrics.buckets.xl
        ),
        format!(
            "- Estimate confidence: high={}, medium={}, low={}",
            metrics.confidence.high, metrics.confidence.medium, metrics.confidence.low
        ),
    ];
    if let Some(rate) = options.hourly_rate {
        lines.push(format!(
            "- Indicative budget at {rate:.0}/h: **{:.0} - {:.0}**",
            metrics.total_hours_low * rate,
            metrics.total_hours_high * rate
        ));
    }
    lines.join("\n")
}

fn assumptions_section(metrics: &SowMetrics) -> String {
    let mut lines = vec![
        "## Assumptions & Known Blockers".to_string(),
        String::new(),
        "- Container images, package binaries, and pipeline run artifacts are reported as gaps and are not migrated automatically.".to_string(),
        "- Secret values (CI variables, webhook tokens, deploy tokens) are never exported and must be recreated on the destination.".to_string(),
    ];
    if metrics.blockers.is_empty() {
        lines.push("- No blockers surfaced by discovery.".to_string());
    } else {
        for blocker in metrics.blockers.iter().take(10) {
            lines.push(format!("- {blocker}"));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeshift_llm::{LlmError, LlmResult};
    use serde_json::json;

    struct CannedProvider {
        reply: Option<String>,
    }

    #[async_trait::async_trait]
    impl ChatProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: ChatRequest) -> LlmResult<String> {
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(LlmError::RequestFailed("offline".to_string())),
            }
        }
    }

    fn inventory() -> Value {
        json!({
            "run": {"base_url": "https://gitlab.example.com", "root_group": "acme"},
            "projects": [{
                "id": 1,
                "path_with_namespace": "acme/api",
                "archived": false,
                "facts": {"has_ci": true, "has_lfs": false},
                "readiness": {"blockers": []},
                "estimate": {"hours_low": 5.0, "hours_high": 10.0,
                             "confidence": "high", "blockers": ["Git LFS migration required"]},
            }]
        })
    }

    #[tokio::test]
    async fn template_fallback_produces_a_complete_document() {
        let inventory = inventory();
        let output = generate_sow(&inventory, &[1], &SowOptions::default(), None).await;
        assert!(output.markdown.contains("# Statement of Work"));
        assert!(output.markdown.contains("## Project Scope"));
        assert!(output.markdown.contains("acme/api"));
        assert!(output.markdown.contains("5.0 - 10.0 hours"));
        assert_eq!(output.metrics.project_count, 1);
    }

    #[tokio::test]
    async fn model_sections_are_used_when_the_provider_answers() {
        let inventory = inventory();
        let provider = CannedProvider {
            reply: Some("## Project Scope\n\nModel-written scope.".to_string()),
        };
        let output = generate_sow(
            &inventory,
            &[],
            &SowOptions {
                client_name: "Acme Corp".to_string(),
                hourly_rate: Some(150.0),
            },
            Some(&provider),
        )
        .await;
        assert!(output.markdown.contains("Model-written scope."));
        assert!(output.markdown.contains("Acme Corp"));
        assert!(output.markdown.contains("750 - 1500"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_the_template() {
        let inventory = inventory();
        let provider = CannedProvider { reply: None };
        let output = generate_sow(&inventory, &[], &SowOptions::default(), Some(&provider)).await;
        assert!(output.markdown.contains("## Project Scope"));
        assert!(output.markdown.contains("acme/api"));
    }

    #[test]
    fn chunking_respects_the_character_budget() {
        let projects: Vec<Value> = (0..200)
            .map(|i| {
                json!({
                    "path_with_namespace": format!("acme/project-with-a-long-name-{i}"),
                    "facts": {"has_ci": true, "has_lfs": false},
                    "readiness": {"blockers": []},
                    "estimate": {"hours_low": 1.0, "hours_high": 2.0, "confidence": "high"},
                })
            })
            .collect();
        let refs: Vec<&Value> = projects.iter().collect();
        let chunks = chunk_project_tables(&refs, 2_000);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 2_100, "chunk too large: {}", chunk.len());
            assert!(chunk.starts_with("| Project |"));
        }
        let total_rows: usize = chunks
            .iter()
            .map(|chunk| chunk.matches("acme/project").count())
            .sum();
        assert_eq!(total_rows, 200);
    }
}
