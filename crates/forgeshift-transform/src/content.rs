//! Issue, merge request, and comment content conversion
//!
//! Rewrites mentions and cross-references through the user map,
//! prepends attribution headers, and sanitizes labels. Task-list
//! syntax is already compatible and passes through untouched.

use crate::result::TransformOutcome;
use regex::{Captures, Regex};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const MAX_LABEL_LEN: usize = 50;

fn mention_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([\w\-.]+)").expect("valid regex"))
}

fn issue_ref_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A leading capture stands in for lookbehind: `#n` not preceded by
    // a word character or `/` (so URLs and anchors are left alone).
    RE.get_or_init(|| Regex::new(r"(^|[^\w/])#(\d+)\b").expect("valid regex"))
}

fn mr_ref_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[^\w])!(\d+)\b").expect("valid regex"))
}

fn video_embed_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+\.mp4[^)]*)\)").expect("valid regex"))
}

fn label_invalid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s\-.:]+").expect("valid regex"))
}

/// User and attachment maps applied during content conversion.
#[derive(Clone, Debug, Default)]
pub struct ContentMaps {
    /// source username -> destination username
    pub users: BTreeMap<String, String>,
    /// source attachment path -> destination URL
    pub attachments: BTreeMap<String, String>,
}

impl ContentMaps {
    /// Build the user map from the user mapper's output.
    pub fn from_user_mappings(mappings: &[Value]) -> Self {
        let mut users = BTreeMap::new();
        for mapping in mappings {
            let source = mapping["source"]["username"].as_str();
            let destination = mapping["destination"]["login"].as_str();
            if let (Some(source), Some(destination)) = (source, destination) {
                users.insert(source.to_string(), destination.to_string());
            }
        }
        Self {
            users,
            attachments: BTreeMap::new(),
        }
    }

    fn mapped_user<'a>(&'a self, username: &'a str) -> &'a str {
        self.users.get(username).map(String::as_str).unwrap_or(username)
    }
}

/// Transform an issue record for the destination.
///
/// Input: the exported issue, the source project path, and the
/// destination `owner/repo`.
pub fn transform_issue(
    issue: &Value,
    source_project: &str,
    destination_repo: &str,
    maps: &ContentMaps,
) -> TransformOutcome {
    let mut outcome = TransformOutcome::new();

    let attribution = attribution_header(
        &issue["author"],
        issue["created_at"].as_str(),
        "issue",
        issue["web_url"].as_str().unwrap_or_default(),
        maps,
    );
    let description = transform_markdown(
        issue["description"].as_str().unwrap_or_default(),
        source_project,
        destination_repo,
        maps,
    );

    outcome.data = Some(json!({
        "title": issue["title"].as_str().unwrap_or_default(),
        "body": format!("{attribution}\n\n{description}"),
        "labels": sanitize_labels(&issue["labels"]),
        "assignees": transform_assignees(&issue["assignees"], maps),
        "milestone": issue["milestone"].clone(),
        "state": if issue["state"].as_str() == Some("opened") { "open" } else { "closed" },
        "metadata": {
            "source_iid": issue["iid"],
            "source_id": issue["id"],
            "source_url": issue["web_url"],
            "created_at": issue["created_at"],
            "updated_at": issue["updated_at"],
        },
    }));
    outcome
}

/// Transform a merge request record into a pull-request shape.
pub fn transform_merge_request(
    mr: &Value,
    source_project: &str,
    destination_repo: &str,
    maps: &ContentMaps,
) -> TransformOutcome {
    let mut outcome = TransformOutcome::new();

    let mut attribution = attribution_header(
        &mr["author"],
        mr["created_at"].as_str(),
        "merge request",
        mr["web_url"].as_str().unwrap_or_default(),
        maps,
    );
    if let Some(reviewers) = mr["reviewers"].as_array() {
        let names: Vec<String> = reviewers
            .iter()
            .filter_map(|r| r["username"].as_str())
            .map(|u| format!("@{u}"))
            .collect();
        if !names.is_empty() {
            attribution.push_str(&format!("\n_Original reviewers: {}_", names.join(", ")));
        }
    }

    let description = transform_markdown(
        mr["description"].as_str().unwrap_or_default(),
        source_project,
        destination_repo,
        maps,
    );
    let draft = mr["draft"].as_bool().unwrap_or(false)
        || mr["work_in_progress"].as_bool().unwrap_or(false);

    outcome.data = Some(json!({
        "title": mr["title"].as_str().unwrap_or_default(),
        "body": format!("{attribution}\n\n{description}"),
        "head": mr["source_branch"].as_str().unwrap_or_default(),
        "base": mr["target_branch"].as_str().unwrap_or("main"),
        "labels": sanitize_labels(&mr["labels"]),
        "assignees": transform_assignees(&mr["assignees"], maps),
        "milestone": mr["milestone"].clone(),
        "draft": draft,
        "state": map_mr_state(mr["state"].as_str().unwrap_or_default()),
        "metadata": {
            "source_iid": mr["iid"],
            "source_id": mr["id"],
            "source_url": mr["web_url"],
            "merge_status": mr["merge_status"],
            "merged_at": mr["merged_at"],
            "created_at": mr["created_at"],
            "updated_at": mr["updated_at"],
        },
    }));
    outcome
}

/// Transform a comment, prepending its own attribution line.
pub fn transform_comment(
    comment: &Value,
    source_project: &str,
    destination_repo: &str,
    maps: &ContentMaps,
) -> Value {
    let author = comment["author"]["username"].as_str().unwrap_or("unknown");
    let mapped = maps.mapped_user(author);
    let created_at = comment["created_at"].as_str().unwrap_or_default();

    let mut attribution = format!("_Originally posted by @{author}");
    if mapped != author {
        attribution.push_str(&format!(" (now @{mapped})"));
    }
    attribution.push_str(&format!(" on {created_at}_\n\n---\n\n"));

    let body = transform_markdown(
        comment["body"].as_str().unwrap_or_default(),
        source_project,
        destination_repo,
        maps,
    );

    json!({
        "body": format!("{attribution}{body}"),
        "metadata": {
            "source_id": comment["id"],
            "created_at": created_at,
            "updated_at": comment["updated_at"],
        },
    })
}

fn attribution_header(
    author: &Value,
    created_at: Option<&str>,
    content_kind: &str,
    original_url: &str,
    maps: &ContentMaps,
) -> String {
    let username = author["username"].as_str().unwrap_or("unknown");
    let mapped = maps.mapped_user(username);
    let date = created_at.unwrap_or("unknown date");

    let mut header = format!("_Originally created as {content_kind} by @{username}");
    if mapped != username {
        header.push_str(&format!(" (now @{mapped})"));
    }
    header.push_str(&format!(" on {date}_"));
    if !original_url.is_empty() {
        header.push_str(&format!("\n_Original URL: {original_url}_"));
    }
    header
}

/// Markdown body conversion: mentions, cross-references, source-only
/// syntax, attachment paths.
pub fn transform_markdown(
    markdown: &str,
    _source_project: &str,
    destination_repo: &str,
    maps: &ContentMaps,
) -> String {
    if markdown.is_empty() {
        return String::new();
    }

    // Mentions through the user map.
    let text = mention_pattern().replace_all(markdown, |captures: &Captures| {
        format!("@{}", maps.mapped_user(&captures[1]))
    });

    // `#n` becomes an explicit `owner/repo#n`.
    let text = if destination_repo.is_empty() {
        text.into_owned()
    } else {
        issue_ref_pattern()
            .replace_all(&text, |captures: &Captures| {
                format!("{}{destination_repo}#{}", &captures[1], &captures[2])
            })
            .into_owned()
    };

    // Source MR references use `!n`; the destination uses `#n` for both.
    let text = mr_ref_pattern().replace_all(&text, "$1#$2").into_owned();

    // Video embeds have no destination equivalent; keep them as links.
    let text = video_embed_pattern()
        .replace_all(&text, "[Video: $1]($2)")
        .into_owned();

    rewrite_attachment_paths(&text, maps)
}

fn rewrite_attachment_paths(text: &str, maps: &ContentMaps) -> String {
    if maps.attachments.is_empty() {
        return text.to_string();
    }
    // Longest paths first so prefixes never clobber longer matches.
    let mut paths: Vec<&String> = maps.attachments.keys().collect();
    paths.sort_by_key(|path| std::cmp::Reverse(path.len()));

    let mut rewritten = text.to_string();
    for path in paths {
        rewritten = rewritten.replace(path.as_str(), &maps.attachments[path]);
    }
    rewritten
}

/// Labels: strip invalid characters, cap the length.
pub fn sanitize_label(label: &Value) -> String {
    let raw = match label {
        Value::Object(map) => map
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let stripped = label_invalid_pattern().replace_all(raw.trim(), "");
    stripped.chars().take(MAX_LABEL_LEN).collect()
}

fn sanitize_labels(labels: &Value) -> Vec<String> {
    labels
        .as_array()
        .map(|labels| labels.iter().map(sanitize_label).collect())
        .unwrap_or_default()
}

fn transform_assignees(assignees: &Value, maps: &ContentMaps) -> Vec<String> {
    assignees
        .as_array()
        .map(|assignees| {
            assignees
                .iter()
                .filter_map(|a| a["username"].as_str())
                .map(|u| maps.mapped_user(u).to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn map_mr_state(state: &str) -> &'static str {
    match state {
        "opened" => "open",
        // The destination has no separate merged state.
        "closed" | "merged" | "locked" => "closed",
        _ => "open",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn maps() -> ContentMaps {
        let mut maps = ContentMaps::default();
        maps.users.insert("jdoe".to_string(), "jane-doe".to_string());
        maps
    }

    #[test]
    fn mentions_follow_the_user_map() {
        let out = transform_markdown("ping @jdoe and @other", "g/p", "org/repo", &maps());
        assert_eq!(out, "ping @jane-doe and @other");
    }

    #[test]
    fn issue_refs_gain_the_repo_prefix() {
        let out = transform_markdown("see #12 and #34.", "g/p", "org/repo", &maps());
        assert_eq!(out, "see org/repo#12 and org/repo#34.");
    }

    #[test]
    fn urls_and_anchors_are_not_rewritten() {
        let out = transform_markdown(
            "https://example.com/x/#12 stays, issue#7 stays",
            "g/p",
            "org/repo",
            &maps(),
        );
        assert!(out.contains("/#12"));
        assert!(out.contains("issue#7"));
    }

    #[test]
    fn mr_refs_become_issue_refs() {
        let out = transform_markdown("merged in !55", "g/p", "org/repo", &maps());
        assert_eq!(out, "merged in #55");
    }

    #[test]
    fn task_lists_pass_through() {
        let body = "- [x] done\n- [ ] not yet";
        assert_eq!(transform_markdown(body, "g/p", "", &maps()), body);
    }

    #[test]
    fn video_embeds_downgrade_to_links() {
        let out = transform_markdown("![demo](clip.mp4)", "g/p", "", &maps());
        assert_eq!(out, "[Video: demo](clip.mp4)");
    }

    #[test]
    fn labels_are_stripped_and_capped() {
        assert_eq!(sanitize_label(&json!("bug: crash!!")), "bug: crash");
        let long = "x".repeat(80);
        assert_eq!(sanitize_label(&json!(long)).len(), MAX_LABEL_LEN);
        assert_eq!(sanitize_label(&json!({"name": "priority::high"})), "priority::high");
    }

    #[test]
    fn issue_transform_carries_attribution_and_state() {
        let issue = json!({
            "id": 900, "iid": 12,
            "title": "Crash on start",
            "description": "fix #3 cc @jdoe",
            "state": "opened",
            "author": {"username": "jdoe"},
            "created_at": "2023-04-01T00:00:00Z",
            "web_url": "https://gitlab.example.com/g/p/-/issues/12",
            "labels": ["bug"],
            "assignees": [{"username": "jdoe"}],
            "milestone": "v1.0",
        });
        let outcome = transform_issue(&issue, "g/p", "org/repo", &maps());
        let data = outcome.data.unwrap();
        assert_eq!(data["state"], "open");
        let body = data["body"].as_str().unwrap();
        assert!(body.starts_with("_Originally created as issue by @jdoe (now @jane-doe)"));
        assert!(body.contains("org/repo#3"));
        assert_eq!(data["assignees"], json!(["jane-doe"]));
        assert_eq!(data["metadata"]["source_iid"], 12);
    }

    #[test]
    fn merged_mr_state_maps_to_closed_with_draft_flag() {
        let mr = json!({
            "id": 1, "iid": 4,
            "title": "Feature",
            "description": "",
            "state": "merged",
            "draft": false,
            "work_in_progress": true,
            "source_branch": "feature",
            "target_branch": "main",
            "author": {"username": "someone"},
            "reviewers": [{"username": "jdoe"}],
        });
        let outcome = transform_merge_request(&mr, "g/p", "org/repo", &maps());
        let data = outcome.data.unwrap();
        assert_eq!(data["state"], "closed");
        assert_eq!(data["draft"], true);
        assert!(data["body"].as_str().unwrap().contains("Original reviewers: @jdoe"));
    }

    #[test]
    fn comments_get_their_own_attribution() {
        let comment = json!({
            "id": 77,
            "body": "agree with !9",
            "author": {"username": "jdoe"},
            "created_at": "2023-05-05T10:00:00Z",
        });
        let out = transform_comment(&comment, "g/p", "org/repo", &maps());
        let body = out["body"].as_str().unwrap();
        assert!(body.starts_with("_Originally posted by @jdoe (now @jane-doe) on 2023-05-05"));
        assert!(body.contains("agree with #9"));
    }

    #[test]
    fn attachment_paths_rewrite_longest_first() {
        let mut maps = maps();
        maps.attachments.insert(
            "/uploads/abc/file.png".to_string(),
            "https://dest.example.com/assets/file.png".to_string(),
        );
        maps.attachments.insert(
            "/uploads/abc".to_string(),
            "https://dest.example.com/assets".to_string(),
        );
        let out = transform_markdown("![x](/uploads/abc/file.png)", "g/p", "", &maps);
        assert!(out.contains("https://dest.example.com/assets/file.png"));
    }
}
