//! Optional LLM-backed effort estimation
//!
//! The model is asked for a fixed JSON shape; anything that fails to
//! parse or validate falls back to the rule-based estimate unchanged.

use crate::scoring::{Breakdown, BreakdownPart, Confidence, MigrationEstimate};
use forgeshift_llm::{extract_json, ChatProvider, ChatRequest};
use serde_json::Value;
use tracing::{debug, info, warn};

const MAX_LIST_ITEMS: usize = 5;
const MAX_CI_PROMPT_CHARS: usize = 3_000;

const ANALYSIS_SYSTEM_PROMPT: &str = r#"Source-to-destination forge migration expert. Return ONLY valid JSON.

HOUR ESTIMATES:
- Code: 1-2h base, +2-4h if LFS/submodules
- MRs: 0.5h per open MR
- Issues: 3h setup + 1h per 100 issues
- CI: 2-4h simple, 8-16h medium, 20-40h complex (DinD, runners, includes)

JSON FORMAT (no other text):
{
  "hours_low": N, "hours_high": N,
  "risk": "low|medium|high",
  "breakdown": {
    "code": {"hours_low": N, "hours_high": N, "notes": "..."},
    "mrs": {"hours_low": N, "hours_high": N, "notes": "..."},
    "issues": {"hours_low": N, "hours_high": N, "notes": "..."},
    "ci": {"hours_low": N, "hours_high": N, "notes": "..."}
  },
  "critical_notes": {"code_notes": [], "mr_notes": [], "issue_notes": [], "ci_notes": []},
  "supported": ["feature1"],
  "not_supported": ["feature2"]
}

RULES: Sum of breakdown = total. Be realistic. Max 3 items per list."#;

/// Model-produced estimate after defensive parsing and clamping.
#[derive(Clone, Debug, PartialEq)]
pub struct AiEstimate {
    pub hours_low: f64,
    pub hours_high: f64,
    pub risk: String,
    pub breakdown: Breakdown,
    pub critical_notes: Value,
    pub supported: Vec<String>,
    pub not_supported: Vec<String>,
}

/// Everything the prompt needs, already serialized for the inventory.
pub struct ProjectPromptData<'a> {
    pub name: &'a str,
    pub archived: bool,
    pub default_branch: Option<&'a str>,
    pub repo_profile: &'a Value,
    pub mr_counts: &'a Value,
    pub issue_counts: &'a Value,
    pub integrations: &'a Value,
    pub ci_content: &'a str,
    pub ci_profile: &'a Value,
}

pub fn build_project_prompt(data: &ProjectPromptData<'_>) -> String {
    let mut parts = Vec::new();

    parts.push("## PROJECT OVERVIEW".to_string());
    parts.push(format!("Name: {}", data.name));
    parts.push(format!("Archived: {}", data.archived));
    parts.push(format!(
        "Default Branch: {}",
        data.default_branch.unwrap_or("main")
    ));

    parts.push("\n## REPOSITORY".to_string());
    for key in ["branches_count", "tags_count", "has_lfs", "has_submodules"] {
        parts.push(format!("- {key}: {}", data.repo_profile[key]));
    }

    parts.push("\n## MERGE REQUESTS".to_string());
    parts.push(data.mr_counts.to_string());
    parts.push("\n## ISSUES".to_string());
    parts.push(data.issue_counts.to_string());

    parts.push("\n## INTEGRATIONS".to_string());
    parts.push(data.integrations.to_string());

    parts.push("\n## CI/CD PIPELINE".to_string());
    if data.ci_content.is_empty() {
        parts.push("- No CI/CD pipeline detected".to_string());
    } else {
        parts.push(format!("- Profile: {}", data.ci_profile));
        parts.push("\n### CI configuration (truncated):".to_string());
        parts.push("```yaml".to_string());
        if data.ci_content.len() > MAX_CI_PROMPT_CHARS {
            let mut end = MAX_CI_PROMPT_CHARS;
            while !data.ci_content.is_char_boundary(end) {
                end -= 1;
            }
            parts.push(data.ci_content[..end].to_string());
            parts.push(format!(
                "... [truncated - full file has {} chars]",
                data.ci_content.len()
            ));
        } else {
            parts.push(data.ci_content.to_string());
        }
        parts.push("```".to_string());
    }

    parts.push("\n## TASK".to_string());
    parts.push("Provide DETAILED breakdown of migration hours for EACH component.".to_string());
    parts.push("Be REALISTIC - consider testing, validation, and edge cases!".to_string());

    parts.join("\n")
}

fn string_list(value: &Value, cap: usize) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .take(cap)
                .collect()
        })
        .unwrap_or_default()
}

fn breakdown_part(value: &Value, fallback: (f64, f64), notes: &str) -> BreakdownPart {
    let mut low = value["hours_low"].as_f64().unwrap_or(fallback.0);
    let mut high = value["hours_high"].as_f64().unwrap_or(fallback.1);
    if low < 0.0 {
        low = 0.0;
    }
    if high < low {
        high = low;
    }
    BreakdownPart {
        hours_low: low,
        hours_high: high,
        notes: value["notes"].as_str().unwrap_or(notes).to_string(),
    }
}

/// Parse the model's reply. Clamps hour ordering, caps the lists, and
/// forces the top-level totals to equal the breakdown sums.
pub fn parse_ai_estimate(text: &str) -> Option<AiEstimate> {
    let data = extract_json(text)?;
    debug!("parsed model estimate payload");

    let mut hours_low = data["hours_low"].as_f64().unwrap_or(2.0);
    let mut hours_high = data["hours_high"].as_f64().unwrap_or(8.0);
    if hours_high < hours_low {
        std::mem::swap(&mut hours_low, &mut hours_high);
    }
    let risk = data["risk"].as_str().unwrap_or("medium").to_string();

    let breakdown = if data["breakdown"].is_object() {
        let b = &data["breakdown"];
        Breakdown {
            code: breakdown_part(&b["code"], (1.0, 2.0), "Standard repo migration"),
            mrs: breakdown_part(&b["mrs"], (0.0, 0.0), "No MR migration specified"),
            issues: breakdown_part(&b["issues"], (0.0, 0.0), "No issue migration specified"),
            ci: breakdown_part(&b["ci"], (0.0, 0.0), "CI/CD migration"),
        }
    } else {
        Breakdown {
            code: BreakdownPart {
                hours_low: 1.0,
                hours_high: 2.0,
                notes: "Standard repo migration".to_string(),
            },
            mrs: BreakdownPart::default(),
            issues: BreakdownPart::default(),
            ci: BreakdownPart {
                hours_low,
                hours_high,
                notes: "CI/CD migration".to_string(),
            },
        }
    };

    // The totals are defined as the breakdown sums.
    let hours_low = (breakdown.total_low() * 10.0).round() / 10.0;
    let hours_high = (breakdown.total_high().max(breakdown.total_low()) * 10.0).round() / 10.0;

    let not_supported = string_list(&data["not_supported"], MAX_LIST_ITEMS);
    let critical_notes = if data["critical_notes"].is_object() {
        data["critical_notes"].clone()
    } else {
        serde_json::json!({
            "code_notes": [],
            "mr_notes": [],
            "issue_notes": [],
            "ci_notes": not_supported,
        })
    };

    Some(AiEstimate {
        hours_low,
        hours_high,
        risk,
        breakdown,
        critical_notes,
        supported: string_list(&data["supported"], MAX_LIST_ITEMS),
        not_supported,
    })
}

/// Ask the model for a full-project estimate; `None` on any failure.
pub async fn ai_full_project_estimate(
    provider: &dyn ChatProvider,
    data: &ProjectPromptData<'_>,
) -> Option<AiEstimate> {
    let request = ChatRequest {
        system: ANALYSIS_SYSTEM_PROMPT.to_string(),
        user: build_project_prompt(data),
        ..Default::default()
    };

    let text = match provider.complete(request).await {
        Ok(text) => text,
        Err(e) => {
            warn!(project = data.name, error = %e, "model estimate failed");
            return None;
        }
    };

    let estimate = parse_ai_estimate(&text);
    if let Some(est) = &estimate {
        info!(
            project = data.name,
            hours_low = est.hours_low,
            hours_high = est.hours_high,
            risk = %est.risk,
            "model estimate"
        );
    } else {
        warn!(project = data.name, "model reply had no usable JSON");
    }
    estimate
}

/// Replace the rule-based numbers with the model's, keeping the
/// rule-based result as the shape and fallback.
pub fn apply_ai_estimate(estimate: &mut MigrationEstimate, ai: &AiEstimate) {
    estimate.hours_low = ai.hours_low;
    estimate.hours_high = ai.hours_high;
    estimate.confidence = match ai.risk.as_str() {
        "low" => Confidence::High,
        "medium" => Confidence::Medium,
        _ => Confidence::Low,
    };
    if !ai.not_supported.is_empty() {
        estimate.blockers = ai.not_supported.iter().take(3).cloned().collect();
    }
    if !ai.supported.is_empty() {
        estimate.drivers = ai.supported.iter().take(5).cloned().collect();
    }
    estimate.breakdown = Some(ai.breakdown.clone());
    estimate.critical_notes = Some(ai.critical_notes.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply_and_sums_breakdown() {
        let reply = r#"```json
{
  "hours_low": 99, "hours_high": 1,
  "risk": "low",
  "breakdown": {
    "code": {"hours_low": 1, "hours_high": 2, "notes": "clone"},
    "mrs": {"hours_low": 1, "hours_high": 2, "notes": "open MRs"},
    "issues": {"hours_low": 2, "hours_high": 4, "notes": "backlog"},
    "ci": {"hours_low": 4, "hours_high": 8, "notes": "workflows"}
  },
  "supported": ["artifacts"],
  "not_supported": ["dind"]
}
```"#;
        let estimate = parse_ai_estimate(reply).unwrap();
        // Top-level totals are the breakdown sums, not the model's numbers.
        assert_eq!(estimate.hours_low, 8.0);
        assert_eq!(estimate.hours_high, 16.0);
        assert!(estimate.hours_low <= estimate.hours_high);
        assert_eq!(estimate.risk, "low");
        assert_eq!(estimate.not_supported, vec!["dind".to_string()]);
    }

    #[test]
    fn missing_breakdown_gets_a_default() {
        let reply = r#"{"hours_low": 3, "hours_high": 6, "risk": "medium"}"#;
        let estimate = parse_ai_estimate(reply).unwrap();
        assert!(estimate.breakdown.total_high() >= estimate.breakdown.total_low());
        assert_eq!(
            estimate.hours_high,
            (estimate.breakdown.total_high() * 10.0).round() / 10.0
        );
    }

    #[test]
    fn unparseable_reply_is_none() {
        assert!(parse_ai_estimate("I cannot help with that").is_none());
    }

    #[test]
    fn lists_are_capped_at_five() {
        let reply = r#"{"hours_low": 1, "hours_high": 2, "risk": "low",
            "supported": ["a","b","c","d","e","f","g"]}"#;
        let estimate = parse_ai_estimate(reply).unwrap();
        assert_eq!(estimate.supported.len(), 5);
    }

    #[test]
    fn applying_replaces_numbers_and_confidence() {
        use crate::scoring::{Bucket, ScopeFlags};
        let mut estimate = MigrationEstimate {
            work_score: 10,
            bucket: Bucket::S,
            hours_low: 1.0,
            hours_high: 2.0,
            confidence: Confidence::High,
            drivers: vec!["rule driver".to_string()],
            blockers: Vec::new(),
            unknowns: Vec::new(),
            scope_flags: ScopeFlags::default(),
            breakdown: None,
            critical_notes: None,
        };
        let ai = parse_ai_estimate(
            r#"{"hours_low": 4, "hours_high": 9, "risk": "high",
                "breakdown": {"code": {"hours_low": 4, "hours_high": 9, "notes": ""},
                              "mrs": {"hours_low": 0, "hours_high": 0, "notes": ""},
                              "issues": {"hours_low": 0, "hours_high": 0, "notes": ""},
                              "ci": {"hours_low": 0, "hours_high": 0, "notes": ""}},
                "not_supported": ["pages"]}"#,
        )
        .unwrap();
        apply_ai_estimate(&mut estimate, &ai);
        assert_eq!(estimate.hours_low, 4.0);
        assert_eq!(estimate.hours_high, 9.0);
        assert_eq!(estimate.confidence, Confidence::Low);
        assert_eq!(estimate.blockers, vec!["pages".to_string()]);
        assert!(estimate.breakdown.is_some());
    }
}
