//! Inventory document validation
//!
//! The schema is fixed, so it is enforced by a dedicated walker over
//! the serialized document rather than a generic draft-07 engine. The
//! checks mirror the published schema: required fields, enums, and the
//! `integer | ">N" | "unknown"` count unions. The run rejects its own
//! output when this fails.

use crate::inventory::Inventory;
use serde_json::Value;

/// Validate a serialized inventory; returns the list of violations.
pub fn validate_inventory_value(doc: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    let Some(root) = doc.as_object() else {
        return vec!["root: expected object".to_string()];
    };

    match root.get("run") {
        Some(run) => validate_run(run, &mut errors),
        None => errors.push("run: missing".to_string()),
    }
    match root.get("groups") {
        Some(Value::Array(groups)) => {
            for (i, group) in groups.iter().enumerate() {
                validate_group(group, i, &mut errors);
            }
        }
        Some(_) => errors.push("groups: expected array".to_string()),
        None => errors.push("groups: missing".to_string()),
    }
    match root.get("projects") {
        Some(Value::Array(projects)) => {
            for (i, project) in projects.iter().enumerate() {
                validate_project(project, i, &mut errors);
            }
        }
        Some(_) => errors.push("projects: expected array".to_string()),
        None => errors.push("projects: missing".to_string()),
    }

    errors
}

/// Validate a typed inventory by serializing it first.
pub fn validate_inventory(inventory: &Inventory) -> Result<(), Vec<String>> {
    let doc = match serde_json::to_value(inventory) {
        Ok(doc) => doc,
        Err(e) => return Err(vec![format!("serialization failed: {e}")]),
    };
    let errors = validate_inventory_value(&doc);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_run(run: &Value, errors: &mut Vec<String>) {
    for field in ["started_at", "finished_at", "base_url", "root_group"] {
        if !run[field].is_string() {
            errors.push(format!("run.{field}: expected string"));
        }
    }
    let stats = &run["stats"];
    if !stats.is_object() {
        errors.push("run.stats: missing".to_string());
        return;
    }
    for field in ["groups", "projects", "errors", "api_calls"] {
        if stats[field].as_u64().is_none() {
            errors.push(format!("run.stats.{field}: expected non-negative integer"));
        }
    }
}

fn validate_group(group: &Value, index: usize, errors: &mut Vec<String>) {
    let at = |field: &str| format!("groups[{index}].{field}");
    if group["id"].as_u64().is_none() {
        errors.push(format!("{}: expected integer", at("id")));
    }
    if !group["full_path"].is_string() {
        errors.push(format!("{}: expected string", at("full_path")));
    }
    match &group["projects"] {
        Value::Array(ids) => {
            if ids.iter().any(|v| v.as_u64().is_none()) {
                errors.push(format!("{}: expected integer ids", at("projects")));
            }
        }
        _ => errors.push(format!("{}: expected array", at("projects"))),
    }
}

fn is_count_union(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_u64().is_some(),
        Value::String(s) => {
            s == "unknown"
                || s.strip_prefix('>')
                    .map(|rest| rest.parse::<u64>().is_ok())
                    .unwrap_or(false)
        }
        _ => false,
    }
}

fn is_detection_union(value: &Value) -> bool {
    matches!(value, Value::Bool(_)) || value.as_str() == Some("unknown")
}

fn validate_counts(value: &Value, fields: &[&str], path: &str, errors: &mut Vec<String>) {
    if value.as_str() == Some("unknown") {
        return;
    }
    let Some(object) = value.as_object() else {
        errors.push(format!("{path}: expected object or \"unknown\""));
        return;
    };
    for field in fields {
        match object.get(*field) {
            Some(v) if is_count_union(v) => {}
            Some(_) => errors.push(format!("{path}.{field}: invalid count")),
            None => errors.push(format!("{path}.{field}: missing")),
        }
    }
}

fn validate_project(project: &Value, index: usize, errors: &mut Vec<String>) {
    let at = |field: &str| format!("projects[{index}].{field}");

    if project["id"].as_u64().is_none() {
        errors.push(format!("{}: expected integer", at("id")));
    }
    if !project["path_with_namespace"].is_string() {
        errors.push(format!("{}: expected string", at("path_with_namespace")));
    }
    if !project["default_branch"].is_string() && !project["default_branch"].is_null() {
        errors.push(format!("{}: expected string or null", at("default_branch")));
    }
    if !project["archived"].is_boolean() {
        errors.push(format!("{}: expected boolean", at("archived")));
    }
    match project["visibility"].as_str() {
        Some("private") | Some("internal") | Some("public") => {}
        _ => errors.push(format!(
            "{}: expected one of private/internal/public",
            at("visibility")
        )),
    }

    let facts = &project["facts"];
    if !facts.is_object() {
        errors.push(format!("{}: missing", at("facts")));
    } else {
        for field in ["has_ci", "has_lfs"] {
            if !is_detection_union(&facts[field]) {
                errors.push(format!(
                    "{}: expected bool or \"unknown\"",
                    at(&format!("facts.{field}"))
                ));
            }
        }
        validate_counts(
            &facts["mr_counts"],
            &["open", "merged", "closed", "total"],
            &at("facts.mr_counts"),
            errors,
        );
        validate_counts(
            &facts["issue_counts"],
            &["open", "closed", "total"],
            &at("facts.issue_counts"),
            errors,
        );
    }

    let readiness = &project["readiness"];
    if !readiness.is_object() {
        errors.push(format!("{}: missing", at("readiness")));
    } else {
        match readiness["complexity"].as_str() {
            Some("low") | Some("medium") | Some("high") => {}
            _ => errors.push(format!(
                "{}: expected one of low/medium/high",
                at("readiness.complexity")
            )),
        }
        for field in ["blockers", "notes"] {
            if !readiness[field].is_array() {
                errors.push(format!(
                    "{}: expected array",
                    at(&format!("readiness.{field}"))
                ));
            }
        }
    }

    match &project["errors"] {
        Value::Array(entries) => {
            for (j, entry) in entries.iter().enumerate() {
                if !entry["step"].is_string() || !entry["message"].is_string() {
                    errors.push(format!(
                        "{}: entries need step and message",
                        at(&format!("errors[{j}]"))
                    ));
                }
            }
        }
        _ => errors.push(format!("{}: expected array", at("errors"))),
    }

    if let Some(estimate) = project.get("estimate").filter(|v| !v.is_null()) {
        let (low, high) = (
            estimate["hours_low"].as_f64(),
            estimate["hours_high"].as_f64(),
        );
        match (low, high) {
            (Some(low), Some(high)) if low <= high => {}
            (Some(_), Some(_)) => errors.push(format!(
                "{}: hours_low must not exceed hours_high",
                at("estimate")
            )),
            _ => errors.push(format!("{}: expected hour range", at("estimate"))),
        }
        match estimate["confidence"].as_str() {
            Some("high") | Some("medium") | Some("low") => {}
            _ => errors.push(format!(
                "{}: expected one of high/medium/low",
                at("estimate.confidence")
            )),
        }
    }
}
