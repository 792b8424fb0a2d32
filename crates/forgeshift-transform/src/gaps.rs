//! Gap aggregation: classify, order, and report conversion gaps

use crate::result::TransformOutcome;
use serde_json::{json, Map, Value};

pub const SEVERITIES: [&str; 4] = ["critical", "high", "medium", "low"];

fn severity_rank(severity: &str) -> usize {
    SEVERITIES
        .iter()
        .position(|s| *s == severity)
        .unwrap_or(2)
}

/// Aggregate gaps from the other transformers and known feature
/// differences into a categorized, action-ordered analysis.
///
/// Input: `{ "cicd_gaps": [...], "user_mappings": {...},
/// "source_features": ["epic", ...], "extra_gaps": [...] }`.
pub fn analyze_gaps(input: &Value) -> TransformOutcome {
    let mut outcome = TransformOutcome::new();
    let mut gaps: Vec<Value> = Vec::new();

    if let Some(cicd_gaps) = input["cicd_gaps"].as_array() {
        for gap in cicd_gaps {
            let kind = gap["type"].as_str().unwrap_or("cicd");
            let severity = match kind {
                "runner_tags" | "custom_executor" => "high",
                _ => "medium",
            };
            gaps.push(json!({
                "type": format!("cicd_{kind}"),
                "message": gap["message"].as_str().unwrap_or("CI/CD conversion gap"),
                "severity": severity,
                "action": gap["action"],
                "context": gap,
            }));
        }
    }

    if input["user_mappings"].is_object() {
        analyze_user_gaps(&input["user_mappings"], &mut gaps);
    }

    if let Some(features) = input["source_features"].as_array() {
        for feature in features.iter().filter_map(|f| f.as_str()) {
            if let Some(gap) = feature_gap(feature) {
                gaps.push(gap);
            }
        }
    }

    if let Some(extra) = input["extra_gaps"].as_array() {
        gaps.extend(extra.iter().cloned());
    }

    let categorized = categorize(&gaps);
    let action_items = action_items(&gaps);
    let critical_count = categorized["critical"].as_array().map(Vec::len).unwrap_or(0);

    if critical_count > 0 {
        let messages: Vec<Value> = categorized["critical"]
            .as_array()
            .map(|gaps| gaps.iter().map(|g| g["message"].clone()).collect())
            .unwrap_or_default();
        outcome.add_warning(
            format!("{critical_count} critical gaps require attention"),
            json!({ "critical_gaps": messages }),
        );
    }

    outcome.set_meta("total_gaps", json!(gaps.len()));
    outcome.set_meta("critical_gaps", json!(critical_count));
    outcome.set_meta("action_items_count", json!(action_items.len()));

    let summary = json!({
        "total_gaps": gaps.len(),
        "by_severity": SEVERITIES.iter().map(|severity| {
            (severity.to_string(), json!(categorized[*severity].as_array().map(Vec::len).unwrap_or(0)))
        }).collect::<Map<String, Value>>(),
        "requires_manual_action": gaps.iter().filter(|g| !g["action"].is_null()).count(),
        "critical_attention_needed": critical_count > 0,
    });

    outcome.data = Some(json!({
        "gaps": gaps,
        "categorized_gaps": categorized,
        "action_items": action_items,
        "summary": summary,
    }));
    outcome
}

fn analyze_user_gaps(user_mappings: &Value, gaps: &mut Vec<Value>) {
    let stats = &user_mappings["stats"];
    let unmapped = stats["unmapped"].as_u64().unwrap_or(0);
    let low_confidence = stats["low_confidence"].as_u64().unwrap_or(0);

    if unmapped > 0 {
        let names: Vec<Value> = user_mappings["unmapped_users"]
            .as_array()
            .map(|users| {
                users
                    .iter()
                    .take(10)
                    .map(|u| u["source"]["username"].clone())
                    .collect()
            })
            .unwrap_or_default();
        gaps.push(json!({
            "type": "user_unmapped",
            "message": format!("{unmapped} users could not be mapped to destination accounts"),
            "severity": if unmapped > 5 { "high" } else { "medium" },
            "action": "Review unmapped users and manually map them, or configure a fallback strategy",
            "context": { "unmapped_count": unmapped, "unmapped_users": names },
        }));
    }
    if low_confidence > 0 {
        gaps.push(json!({
            "type": "user_low_confidence",
            "message": format!("{low_confidence} users mapped with low confidence"),
            "severity": "medium",
            "action": "Review low confidence mappings and confirm or adjust",
            "context": { "low_confidence_count": low_confidence },
        }));
    }
}

fn feature_gap(feature: &str) -> Option<Value> {
    let (message, severity, action) = match feature.to_ascii_lowercase().as_str() {
        "epic" => (
            "Epics are not directly supported on the destination",
            "medium",
            "Convert epics to issues with an epic label and link child issues",
        ),
        "roadmap" => (
            "Roadmaps are not directly supported on the destination",
            "low",
            "Use destination project boards or roadmap documentation",
        ),
        "time_tracking" => (
            "Time tracking is not natively supported on the destination",
            "low",
            "Use third-party integrations or track in issue comments",
        ),
        "requirements" => (
            "Requirements management is not available on the destination",
            "medium",
            "Convert to issues with a requirements label",
        ),
        "compliance" => (
            "Compliance features differ between the forges",
            "high",
            "Review compliance requirements and configure destination equivalents",
        ),
        "vulnerabilities" => (
            "Vulnerability tracking differs between the forges",
            "medium",
            "Enable destination security features and review vulnerability reports",
        ),
        _ => return None,
    };
    Some(json!({
        "type": format!("feature_{feature}"),
        "message": message,
        "severity": severity,
        "action": action,
        "context": { "feature": feature },
    }))
}

fn categorize(gaps: &[Value]) -> Value {
    let mut categorized: Map<String, Value> = SEVERITIES
        .iter()
        .map(|severity| (severity.to_string(), json!([])))
        .collect();
    for gap in gaps {
        let severity = gap["severity"].as_str().unwrap_or("medium");
        let bucket = categorized
            .entry(severity.to_string())
            .or_insert_with(|| json!([]));
        bucket.as_array_mut().expect("array bucket").push(gap.clone());
    }
    Value::Object(categorized)
}

fn action_items(gaps: &[Value]) -> Vec<Value> {
    let mut ordered: Vec<&Value> = gaps.iter().collect();
    ordered.sort_by_key(|gap| severity_rank(gap["severity"].as_str().unwrap_or("medium")));

    ordered
        .iter()
        .filter(|gap| !gap["action"].is_null())
        .enumerate()
        .map(|(index, gap)| {
            json!({
                "priority": index + 1,
                "severity": gap["severity"],
                "type": gap["type"],
                "action": gap["action"],
                "message": gap["message"],
                "context": gap["context"],
            })
        })
        .collect()
}

/// Render the analysis as a Markdown report for operators.
pub fn gap_report(categorized: &Value) -> String {
    let count = |severity: &str| {
        categorized[severity]
            .as_array()
            .map(Vec::len)
            .unwrap_or(0)
    };
    let total: usize = SEVERITIES.iter().map(|s| count(s)).sum();

    let mut lines = vec![
        "# Migration Conversion Gaps Report".to_string(),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        format!("- **Total Gaps**: {total}"),
        format!("- **Critical**: {}", count("critical")),
        format!("- **High**: {}", count("high")),
        format!("- **Medium**: {}", count("medium")),
        format!("- **Low**: {}", count("low")),
        String::new(),
    ];

    for severity in SEVERITIES {
        let Some(gaps) = categorized[severity].as_array().filter(|g| !g.is_empty()) else {
            continue;
        };
        lines.push(format!("## {} severity", capitalize(severity)));
        lines.push(String::new());
        for gap in gaps {
            lines.push(format!(
                "- **{}**: {}",
                gap["type"].as_str().unwrap_or("gap"),
                gap["message"].as_str().unwrap_or_default()
            ));
            if let Some(action) = gap["action"].as_str() {
                lines.push(format!("  - Action: {action}"));
            }
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_input() -> Value {
        json!({
            "cicd_gaps": [
                {"type": "runner_tags", "message": "Custom tags", "action": "Set up runners"},
                {"type": "schedule", "message": "Default schedule", "action": "Fix cron"},
            ],
            "user_mappings": {
                "stats": {"unmapped": 7, "low_confidence": 2},
                "unmapped_users": [{"source": {"username": "ghost"}}],
            },
            "source_features": ["epic", "compliance", "nonexistent"],
        })
    }

    #[test]
    fn aggregates_and_categorizes_by_severity() {
        let outcome = analyze_gaps(&sample_input());
        let data = outcome.data.as_ref().unwrap();
        // 2 CI gaps + 2 user gaps + 2 known feature gaps.
        assert_eq!(data["summary"]["total_gaps"], 6);
        assert_eq!(data["summary"]["by_severity"]["high"], 3);
        let highs = data["categorized_gaps"]["high"].as_array().unwrap();
        assert!(highs.iter().any(|g| g["type"] == "cicd_runner_tags"));
        assert!(highs.iter().any(|g| g["type"] == "user_unmapped"));
    }

    #[test]
    fn action_items_are_ordered_by_severity() {
        let outcome = analyze_gaps(&sample_input());
        let items = outcome.data.as_ref().unwrap()["action_items"]
            .as_array()
            .unwrap()
            .clone();
        assert!(!items.is_empty());
        let ranks: Vec<usize> = items
            .iter()
            .map(|item| severity_rank(item["severity"].as_str().unwrap()))
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
        assert_eq!(items[0]["priority"], 1);
    }

    #[test]
    fn markdown_report_lists_counts_and_actions() {
        let outcome = analyze_gaps(&sample_input());
        let report = gap_report(&outcome.data.as_ref().unwrap()["categorized_gaps"]);
        assert!(report.starts_with("# Migration Conversion Gaps Report"));
        assert!(report.contains("- **Total Gaps**: 6"));
        assert!(report.contains("## High severity"));
        assert!(report.contains("Action: Set up runners"));
    }

    #[test]
    fn empty_input_is_a_clean_report() {
        let outcome = analyze_gaps(&json!({}));
        let data = outcome.data.as_ref().unwrap();
        assert_eq!(data["summary"]["total_gaps"], 0);
        assert!(outcome.warnings.is_empty());
    }
}
