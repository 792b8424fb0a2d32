//! Webhook conversion: event-by-event mapping with a fixed dictionary
//!
//! Unmappable events produce warnings; a webhook whose mapped set
//! would be empty defaults to `push`. Secrets are never forwarded from
//! the source.

use crate::result::TransformOutcome;
use serde_json::{json, Value};
use tracing::info;

/// Source event flag -> destination event names.
const EVENT_MAPPING: &[(&str, &[&str])] = &[
    ("push_events", &["push"]),
    ("tag_push_events", &["create"]),
    ("issues_events", &["issues"]),
    ("confidential_issues_events", &["issues"]),
    ("merge_requests_events", &["pull_request"]),
    ("note_events", &["issue_comment", "pull_request_review_comment"]),
    (
        "confidential_note_events",
        &["issue_comment", "pull_request_review_comment"],
    ),
    ("wiki_page_events", &["gollum"]),
    ("pipeline_events", &["workflow_run", "check_suite"]),
    ("job_events", &["workflow_job"]),
    ("deployment_events", &["deployment", "deployment_status"]),
    ("releases_events", &["release"]),
];

/// Source events with no destination equivalent.
const UNMAPPABLE_EVENTS: &[(&str, &str)] = &[
    ("repository_update_events", "No destination equivalent"),
    ("subgroup_events", "Destination has no subgroups"),
    ("feature_flag_events", "No destination equivalent"),
    ("alert_events", "No destination equivalent"),
];

/// Transform a list of source webhooks.
///
/// Input: `{ "webhooks": [...] }` as exported by the settings
/// component.
pub fn transform_webhooks(input: &Value) -> TransformOutcome {
    let mut outcome = TransformOutcome::new();

    let webhooks = input["webhooks"].as_array().cloned().unwrap_or_default();
    if webhooks.is_empty() {
        info!("no webhooks to transform");
        outcome.set_meta("webhook_count", json!(0));
        outcome.data = Some(json!({ "webhooks": [] }));
        return outcome;
    }

    let mut transformed: Vec<Value> = Vec::new();
    for webhook in &webhooks {
        if let Some(result) = transform_webhook(webhook, &mut outcome) {
            transformed.push(result);
        }
    }

    outcome.set_meta("webhook_count", json!(webhooks.len()));
    outcome.set_meta("transformed_count", json!(transformed.len()));
    outcome.set_meta(
        "skipped_count",
        json!(webhooks.len() - transformed.len()),
    );
    info!(
        transformed = transformed.len(),
        total = webhooks.len(),
        "webhooks transformed"
    );
    outcome.data = Some(json!({ "webhooks": transformed }));
    outcome
}

fn transform_webhook(webhook: &Value, outcome: &mut TransformOutcome) -> Option<Value> {
    let Some(url) = webhook["url"].as_str() else {
        outcome.add_error("Webhook missing URL", json!({"webhook_id": webhook["id"]}));
        return None;
    };

    let mut events: Vec<String> = Vec::new();
    let mut unmapped: Vec<Value> = Vec::new();
    let mut source_events: Vec<String> = Vec::new();

    let entries = webhook.as_object()?;
    for (key, enabled) in entries {
        if !key.ends_with("_events") || enabled.as_bool() != Some(true) {
            continue;
        }
        source_events.push(key.clone());

        if let Some((_, mapped)) = EVENT_MAPPING.iter().find(|(name, _)| name == key) {
            events.extend(mapped.iter().map(|e| e.to_string()));
        } else if let Some((_, reason)) = UNMAPPABLE_EVENTS.iter().find(|(name, _)| name == key) {
            unmapped.push(json!({ "source_event": key, "reason": reason }));
        } else {
            outcome.add_warning(
                format!("Unknown source webhook event type: {key}"),
                json!({"webhook_url": url}),
            );
        }
    }

    events.sort();
    events.dedup();

    if events.is_empty() {
        events.push("push".to_string());
        outcome.add_warning(
            "No events mapped from source, defaulting to 'push'",
            json!({"webhook_url": url}),
        );
    }
    for entry in &unmapped {
        outcome.add_warning(
            format!(
                "Source event '{}' cannot be mapped: {}",
                entry["source_event"].as_str().unwrap_or_default(),
                entry["reason"].as_str().unwrap_or_default()
            ),
            json!({"webhook_url": url}),
        );
    }

    Some(json!({
        "id": webhook["id"],
        "url": url,
        "events": events,
        "active": !webhook["disabled"].as_bool().unwrap_or(false),
        "content_type": "json",
        "insecure_ssl": !webhook["enable_ssl_verification"].as_bool().unwrap_or(true),
        // Secrets are regenerated on the destination, never forwarded.
        "secret": Value::Null,
        "source_id": webhook["id"],
        "source_events": source_events,
        "unmapped_events": unmapped,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_common_events() {
        let input = json!({"webhooks": [{
            "id": 5,
            "url": "https://hooks.example.com/ci",
            "push_events": true,
            "merge_requests_events": true,
            "note_events": true,
            "enable_ssl_verification": true,
        }]});
        let outcome = transform_webhooks(&input);
        let hook = &outcome.data.as_ref().unwrap()["webhooks"][0];
        let events: Vec<&str> = hook["events"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(
            events,
            vec![
                "issue_comment",
                "pull_request",
                "pull_request_review_comment",
                "push"
            ]
        );
        assert!(hook["secret"].is_null());
    }

    #[test]
    fn unmappable_only_hook_defaults_to_push_with_warnings() {
        let input = json!({"webhooks": [{
            "id": 6,
            "url": "https://hooks.example.com/flags",
            "feature_flag_events": true,
        }]});
        let outcome = transform_webhooks(&input);
        let hook = &outcome.data.as_ref().unwrap()["webhooks"][0];
        assert_eq!(hook["events"], json!(["push"]));
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("defaulting to 'push'")));
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("feature_flag_events")));
    }

    #[test]
    fn missing_url_is_an_error() {
        let input = json!({"webhooks": [{"id": 9, "push_events": true}]});
        let outcome = transform_webhooks(&input);
        assert!(!outcome.success);
        assert!(outcome.data.as_ref().unwrap()["webhooks"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn ssl_verification_inverts_to_insecure_flag() {
        let input = json!({"webhooks": [{
            "id": 7,
            "url": "https://hooks.example.com/x",
            "push_events": true,
            "enable_ssl_verification": false,
        }]});
        let outcome = transform_webhooks(&input);
        let hook = &outcome.data.as_ref().unwrap()["webhooks"][0];
        assert_eq!(hook["insecure_ssl"], true);
    }
}
