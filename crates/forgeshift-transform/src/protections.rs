//! Branch and tag protection conversion, plus CODEOWNERS synthesis

use crate::result::TransformOutcome;
use serde_json::{json, Value};

const MAINTAINER_ACCESS_LEVEL: u64 = 40;

/// Transform protected branches and tags to destination protection
/// rules.
///
/// Input: `{ "protected_branches": [...], "protected_tags": [...],
/// "project_members": [...], "ci_jobs": [...], "approval_rules": [...] }`.
/// Restrictions that need manual user or team mapping are flagged as
/// gaps; a CODEOWNERS file is synthesized when approval rules are
/// supplied.
pub fn transform_protections(input: &Value) -> TransformOutcome {
    let mut outcome = TransformOutcome::new();

    let Some(protected_branches) = input["protected_branches"].as_array() else {
        outcome.add_error("Missing required field: protected_branches", Value::Null);
        return outcome;
    };
    let protected_tags = input["protected_tags"].as_array().cloned().unwrap_or_default();
    let project_members = input["project_members"].as_array().cloned().unwrap_or_default();
    let ci_jobs: Vec<String> = input["ci_jobs"]
        .as_array()
        .map(|jobs| {
            jobs.iter()
                .filter_map(|j| j.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let mut gaps: Vec<Value> = Vec::new();
    let branch_protections: Vec<Value> = protected_branches
        .iter()
        .map(|branch| transform_branch(branch, &ci_jobs, &mut gaps))
        .collect();

    let tag_protections: Vec<Value> = protected_tags
        .iter()
        .map(|tag| {
            let name = tag["name"].as_str().unwrap_or_default();
            gaps.push(json!({
                "type": "protection_tag_protection",
                "message": format!("Protected tag '{name}' requires a destination plan that supports tag protection rules"),
                "severity": "medium",
                "context": { "tag": name, "action": "Protect tags manually or upgrade the destination plan" },
            }));
            json!({
                "pattern": name,
                "note": format!("Migrated from protected tag: {name}"),
            })
        })
        .collect();

    let codeowners = if input.get("approval_rules").is_some() {
        Some(generate_codeowners(
            input["approval_rules"].as_array().map(Vec::as_slice).unwrap_or_default(),
            &project_members,
            &mut gaps,
        ))
    } else {
        None
    };

    for gap in &gaps {
        outcome.add_warning(
            gap["message"].as_str().unwrap_or_default().to_string(),
            gap["context"].clone(),
        );
    }

    outcome.set_meta("branches_protected", json!(branch_protections.len()));
    outcome.set_meta("tags_protected", json!(tag_protections.len()));
    outcome.set_meta("conversion_gaps", json!(gaps.len()));
    outcome.set_meta("has_codeowners", json!(codeowners.is_some()));
    outcome.data = Some(json!({
        "branch_protections": branch_protections,
        "protected_tags": tag_protections,
        "codeowners_content": codeowners,
        "gaps": gaps,
    }));
    outcome
}

fn transform_branch(branch: &Value, ci_jobs: &[String], gaps: &mut Vec<Value>) -> Value {
    let branch_name = branch["name"].as_str().unwrap_or_default();

    let merge_access_levels = branch["merge_access_levels"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let push_access_levels = branch["push_access_levels"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let required_reviews = if merge_access_levels.is_empty() {
        Value::Null
    } else {
        map_merge_access_to_reviews(branch, &merge_access_levels)
    };

    let mut protection = json!({
        "branch": branch_name,
        "required_status_checks": Value::Null,
        "enforce_admins": false,
        "required_pull_request_reviews": required_reviews,
        "restrictions": Value::Null,
        "allow_force_pushes": branch["allow_force_push"].as_bool().unwrap_or(false),
        "allow_deletions": false,
        "required_linear_history": false,
        "required_conversation_resolution": false,
    });

    if branch["code_owner_approval_required"].as_bool().unwrap_or(false)
        && protection["required_pull_request_reviews"].is_object()
    {
        protection["required_pull_request_reviews"]["require_code_owner_reviews"] = json!(true);
    }

    if !ci_jobs.is_empty() {
        protection["required_status_checks"] = json!({
            "strict": true,
            "contexts": ci_jobs,
        });
    }

    if let Some(level) = branch.get("unprotect_access_level").filter(|v| !v.is_null()) {
        gaps.push(json!({
            "type": "protection_unprotect_access_level",
            "message": format!("Source unprotect_access_level ({level}) has no destination equivalent"),
            "severity": "medium",
            "context": { "branch": branch_name, "access_level": level },
        }));
    }

    if has_restricted_push(&push_access_levels) {
        gaps.push(json!({
            "type": "protection_push_restrictions",
            "message": format!("Push restrictions for '{branch_name}' require manual user/team mapping on the destination"),
            "severity": "high",
            "context": {
                "branch": branch_name,
                "push_access_levels": push_access_levels,
                "action": "Configure push restrictions in destination repository settings",
            },
        }));
    }

    protection
}

fn map_merge_access_to_reviews(branch: &Value, merge_access_levels: &[Value]) -> Value {
    let approvals = branch["approvals_before_merge"].as_u64().unwrap_or(0);
    let maintainer_only = merge_access_levels
        .iter()
        .any(|level| level["access_level"].as_u64() == Some(MAINTAINER_ACCESS_LEVEL));

    let required = if approvals > 0 {
        approvals
    } else if maintainer_only {
        1
    } else {
        1
    };

    json!({
        "dismiss_stale_reviews": false,
        "require_code_owner_reviews": false,
        "required_approving_review_count": required,
        "dismissal_restrictions": {},
    })
}

fn has_restricted_push(push_access_levels: &[Value]) -> bool {
    push_access_levels.iter().any(|level| {
        !level["user_id"].is_null()
            || !level["group_id"].is_null()
            || level["access_level"].as_u64() == Some(0)
    })
}

/// Build a CODEOWNERS document from approval rules.
fn generate_codeowners(
    approval_rules: &[Value],
    project_members: &[Value],
    gaps: &mut Vec<Value>,
) -> String {
    let mut lines = vec![
        "# CODEOWNERS".to_string(),
        "# Generated from source approval rules".to_string(),
        String::new(),
    ];

    let member_username = |user_id: Option<u64>| -> Option<String> {
        let id = user_id?;
        project_members
            .iter()
            .find(|member| member["id"].as_u64() == Some(id))
            .and_then(|member| member["username"].as_str().map(String::from))
    };

    let mut wrote_rule = false;
    for rule in approval_rules {
        let rule_name = rule["name"].as_str().unwrap_or_default();
        let mut owners: Vec<String> = Vec::new();

        if let Some(approvers) = rule["eligible_approvers"].as_array() {
            for approver in approvers {
                let username = member_username(approver["id"].as_u64())
                    .or_else(|| approver["username"].as_str().map(String::from));
                if let Some(username) = username {
                    owners.push(format!("@{username}"));
                }
            }
        }
        if let Some(groups) = rule["groups"].as_array() {
            for group in groups {
                if let Some(path) = group["path"].as_str().or_else(|| group["name"].as_str()) {
                    owners.push(format!("@org/{path}"));
                }
            }
        }

        if owners.is_empty() {
            continue;
        }

        let pattern = rule["file_pattern"].as_str().filter(|p| !p.is_empty()).unwrap_or("*");
        lines.push(format!("# Rule: {rule_name}"));
        lines.push(format!("{pattern} {}", owners.join(" ")));
        lines.push(String::new());
        wrote_rule = true;
    }

    if !wrote_rule {
        lines.push("# Default: All files require review".to_string());
        lines.push("* @org/maintainers".to_string());
        lines.push(String::new());
        gaps.push(json!({
            "type": "protection_codeowners_default",
            "message": "No specific approval rules found, using default CODEOWNERS",
            "severity": "low",
            "context": { "action": "Review and customize CODEOWNERS file" },
        }));
    }

    lines.join("\n")
}

/// Job names usable as required status checks, pulled from a parsed
/// CI document (reserved keys and hidden entries excluded).
pub fn status_checks_from_ci(ci_doc: &Value) -> Vec<String> {
    const SKIP: &[&str] = &[
        "stages",
        "variables",
        "workflow",
        "include",
        "default",
        "image",
        "services",
        "before_script",
        "after_script",
        "cache",
    ];

    let mut jobs = Vec::new();
    if let Some(entries) = ci_doc.as_object() {
        for (key, value) in entries {
            if key.starts_with('.') || SKIP.contains(&key.as_str()) {
                continue;
            }
            if value.is_object() && (!value["script"].is_null() || !value["trigger"].is_null()) {
                jobs.push(key.clone());
            }
        }
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn protected_branch() -> Value {
        json!({
            "name": "main",
            "push_access_levels": [{"access_level": 40, "access_level_description": "Maintainers"}],
            "merge_access_levels": [{"access_level": 40, "access_level_description": "Maintainers"}],
            "allow_force_push": false,
            "code_owner_approval_required": true,
            "approvals_before_merge": 2,
        })
    }

    #[test]
    fn maintainer_merge_becomes_required_reviews() {
        let outcome = transform_protections(&json!({
            "protected_branches": [protected_branch()],
            "ci_jobs": ["build", "test"],
        }));
        let protection = &outcome.data.as_ref().unwrap()["branch_protections"][0];
        let reviews = &protection["required_pull_request_reviews"];
        assert_eq!(reviews["required_approving_review_count"], 2);
        assert_eq!(reviews["require_code_owner_reviews"], true);
        assert_eq!(
            protection["required_status_checks"]["contexts"],
            json!(["build", "test"])
        );
        assert_eq!(protection["allow_force_pushes"], false);
    }

    #[test]
    fn user_scoped_push_access_is_a_high_severity_gap() {
        let mut branch = protected_branch();
        branch["push_access_levels"] = json!([{"access_level": 40, "user_id": 77}]);
        let outcome = transform_protections(&json!({
            "protected_branches": [branch],
        }));
        let gaps = outcome.data.as_ref().unwrap()["gaps"].as_array().unwrap().clone();
        assert!(gaps
            .iter()
            .any(|g| g["type"] == "protection_push_restrictions" && g["severity"] == "high"));
        assert!(!outcome.warnings.is_empty());
    }

    #[test]
    fn protected_tags_map_to_patterns_with_gaps() {
        let outcome = transform_protections(&json!({
            "protected_branches": [],
            "protected_tags": [{"name": "v*"}],
        }));
        let data = outcome.data.as_ref().unwrap();
        assert_eq!(data["protected_tags"][0]["pattern"], "v*");
        assert_eq!(outcome.metadata["tags_protected"], 1);
    }

    #[test]
    fn codeowners_synthesized_from_approval_rules() {
        let outcome = transform_protections(&json!({
            "protected_branches": [],
            "project_members": [{"id": 7, "username": "jdoe"}],
            "approval_rules": [{
                "name": "Backend",
                "eligible_approvers": [{"id": 7}],
                "groups": [{"path": "backend-team"}],
                "file_pattern": "src/*",
            }],
        }));
        let codeowners = outcome.data.as_ref().unwrap()["codeowners_content"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(codeowners.contains("src/* @jdoe @org/backend-team"));
    }

    #[test]
    fn empty_approval_rules_fall_back_to_a_default_codeowners() {
        let outcome = transform_protections(&json!({
            "protected_branches": [],
            "approval_rules": [],
        }));
        let codeowners = outcome.data.as_ref().unwrap()["codeowners_content"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(codeowners.contains("* @org/maintainers"));
    }

    #[test]
    fn status_checks_extracted_from_ci_doc() {
        let ci = json!({
            "stages": ["build"],
            ".hidden": {"script": ["x"]},
            "build": {"script": ["make"]},
            "bridge": {"trigger": "other/project"},
        });
        let mut checks = status_checks_from_ci(&ci);
        checks.sort();
        assert_eq!(checks, vec!["bridge", "build"]);
    }
}
