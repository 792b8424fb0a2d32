//! Source-to-destination user identity mapping
//!
//! Match order: exact email, then username (exact, then fuzzy at
//! 0.75), then display name (exact, then fuzzy at 0.85). The
//! thresholds favor unmapped users over wrong matches; the unmapped
//! list is the operator's primary surface.

use crate::result::TransformOutcome;
use serde_json::{json, Value};
use similar::TextDiff;
use tracing::info;

pub const USERNAME_FUZZY_THRESHOLD: f64 = 0.75;
pub const NAME_FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchConfidence {
    High,
    Medium,
    Low,
    Unmapped,
}

impl MatchConfidence {
    fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unmapped => "unmapped",
        }
    }
}

/// Map a set of source users against known destination users.
///
/// Input: `{ "source_users": [...], "destination_users": [...],
/// "org_members": [...] }`. Output data carries `mappings`, `stats`,
/// and the discrete `unmapped_users` list.
pub fn map_users(input: &Value) -> TransformOutcome {
    let mut outcome = TransformOutcome::new();

    let Some(source_users) = input["source_users"].as_array() else {
        outcome.add_error("Missing required field: source_users", Value::Null);
        return outcome;
    };
    let destination_users = combine_destination_users(
        input["destination_users"].as_array().map(Vec::as_slice),
        input["org_members"].as_array().map(Vec::as_slice),
    );

    let mut mappings: Vec<Value> = Vec::new();
    let mut unmapped: Vec<Value> = Vec::new();
    let mut high = 0u64;
    let mut medium = 0u64;
    let mut low = 0u64;

    for source in source_users {
        let mapping = map_single_user(source, &destination_users);
        match mapping.1 {
            MatchConfidence::High => high += 1,
            MatchConfidence::Medium => medium += 1,
            MatchConfidence::Low => low += 1,
            MatchConfidence::Unmapped => unmapped.push(mapping.0.clone()),
        }
        mappings.push(mapping.0);
    }

    let stats = json!({
        "total": source_users.len(),
        "high_confidence": high,
        "medium_confidence": medium,
        "low_confidence": low,
        "unmapped": unmapped.len(),
    });
    info!(
        total = source_users.len(),
        mapped = high + medium + low,
        "user mapping complete"
    );

    if !unmapped.is_empty() {
        let names: Vec<Value> = unmapped
            .iter()
            .map(|m| m["source"]["username"].clone())
            .collect();
        outcome.add_warning(
            format!("{} users could not be mapped", unmapped.len()),
            json!({ "unmapped_users": names }),
        );
    }

    if let Some(entries) = stats.as_object() {
        for (key, value) in entries {
            outcome.set_meta(key, value.clone());
        }
    }
    outcome.data = Some(json!({
        "mappings": mappings,
        "stats": stats,
        "unmapped_users": unmapped,
    }));
    outcome
}

fn combine_destination_users(users: Option<&[Value]>, members: Option<&[Value]>) -> Vec<Value> {
    let mut seen = std::collections::BTreeSet::new();
    let mut combined = Vec::new();
    for user in users.unwrap_or_default().iter().chain(members.unwrap_or_default()) {
        if let Some(login) = user["login"].as_str() {
            if seen.insert(login.to_string()) {
                combined.push(user.clone());
            }
        }
    }
    combined
}

fn map_single_user(source: &Value, destinations: &[Value]) -> (Value, MatchConfidence) {
    let source_record = json!({
        "id": source["id"],
        "username": source["username"],
        "email": source["email"],
        "name": source["name"],
    });

    let (matched, confidence, method) = if let Some(hit) = match_by_email(source, destinations) {
        (Some(hit), MatchConfidence::High, "email")
    } else if let Some(hit) = match_by_username(source, destinations) {
        (Some(hit), MatchConfidence::Medium, "username")
    } else if let Some(hit) = match_by_name(source, destinations) {
        (Some(hit), MatchConfidence::Low, "name")
    } else {
        (None, MatchConfidence::Unmapped, "none")
    };

    let destination = matched
        .map(|hit| {
            json!({
                "login": hit["login"],
                "id": hit["id"],
                "email": hit["email"],
                "name": hit["name"],
            })
        })
        .unwrap_or(Value::Null);

    (
        json!({
            "source": source_record,
            "destination": destination,
            "confidence": confidence.as_str(),
            "method": method,
            "confirmed_by_user": false,
        }),
        confidence,
    )
}

fn match_by_email<'a>(source: &Value, destinations: &'a [Value]) -> Option<&'a Value> {
    let email = source["email"].as_str()?.trim().to_ascii_lowercase();
    if email.is_empty() {
        return None;
    }
    destinations.iter().find(|candidate| {
        candidate["email"]
            .as_str()
            .map(|e| e.trim().to_ascii_lowercase() == email)
            .unwrap_or(false)
    })
}

fn match_by_username<'a>(source: &Value, destinations: &'a [Value]) -> Option<&'a Value> {
    let username = source["username"].as_str()?.trim().to_ascii_lowercase();
    if username.is_empty() {
        return None;
    }

    if let Some(exact) = destinations.iter().find(|candidate| {
        candidate["login"]
            .as_str()
            .map(|l| l.trim().to_ascii_lowercase() == username)
            .unwrap_or(false)
    }) {
        return Some(exact);
    }

    let normalized = normalize_username(&username);
    best_fuzzy_match(destinations, USERNAME_FUZZY_THRESHOLD, |candidate| {
        candidate["login"].as_str().map(normalize_username)
    }, &normalized)
}

fn match_by_name<'a>(source: &Value, destinations: &'a [Value]) -> Option<&'a Value> {
    let name = source["name"].as_str()?.trim().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }

    if let Some(exact) = destinations.iter().find(|candidate| {
        candidate["name"]
            .as_str()
            .map(|n| n.trim().to_ascii_lowercase() == name)
            .unwrap_or(false)
    }) {
        return Some(exact);
    }

    let normalized = normalize_name(&name);
    best_fuzzy_match(destinations, NAME_FUZZY_THRESHOLD, |candidate| {
        candidate["name"].as_str().map(normalize_name)
    }, &normalized)
}

fn best_fuzzy_match<'a>(
    destinations: &'a [Value],
    threshold: f64,
    key: impl Fn(&Value) -> Option<String>,
    target: &str,
) -> Option<&'a Value> {
    let mut best: Option<&Value> = None;
    let mut best_score = 0.0f64;
    for candidate in destinations {
        let Some(candidate_key) = key(candidate) else {
            continue;
        };
        let score = similarity(target, &candidate_key);
        if score > best_score {
            best_score = score;
            best = Some(candidate);
        }
    }
    if best_score >= threshold {
        best
    } else {
        None
    }
}

/// Character-level similarity ratio in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    TextDiff::from_chars(a, b).ratio() as f64
}

fn normalize_username(username: &str) -> String {
    username
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | '_'))
        .collect()
}

fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_ascii_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|c| if matches!(c, '.' | '-' | '_' | ',') { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(username: &str, email: Option<&str>, name: &str) -> Value {
        json!({"id": 1, "username": username, "email": email, "name": name})
    }

    fn destination(login: &str, email: Option<&str>, name: &str) -> Value {
        json!({"id": 2, "login": login, "email": email, "name": name})
    }

    #[test]
    fn email_match_is_high_confidence() {
        let input = json!({
            "source_users": [source("jdoe", Some("J.Doe@Example.com"), "Jane Doe")],
            "destination_users": [destination("jane-d", Some("j.doe@example.com"), "Jane D")],
        });
        let outcome = map_users(&input);
        let mapping = &outcome.data.as_ref().unwrap()["mappings"][0];
        assert_eq!(mapping["confidence"], "high");
        assert_eq!(mapping["method"], "email");
        assert_eq!(mapping["destination"]["login"], "jane-d");
    }

    #[test]
    fn exact_username_match_is_medium_confidence() {
        let input = json!({
            "source_users": [source("jdoe", None, "Jane Doe")],
            "destination_users": [destination("JDoe", None, "Somebody Else")],
        });
        let outcome = map_users(&input);
        let mapping = &outcome.data.as_ref().unwrap()["mappings"][0];
        assert_eq!(mapping["confidence"], "medium");
        assert_eq!(mapping["method"], "username");
    }

    #[test]
    fn fuzzy_username_match_respects_the_threshold() {
        let input = json!({
            "source_users": [source("jane.doe", None, "")],
            "destination_users": [destination("jane-doe1", None, "")],
        });
        let outcome = map_users(&input);
        let mapping = &outcome.data.as_ref().unwrap()["mappings"][0];
        // Normalized forms "janedoe" vs "janedoe1" are close enough.
        assert_eq!(mapping["confidence"], "medium");
    }

    #[test]
    fn dissimilar_users_stay_unmapped() {
        let input = json!({
            "source_users": [source("alice", None, "Alice A")],
            "destination_users": [destination("zeta", None, "Zeta Z")],
        });
        let outcome = map_users(&input);
        let data = outcome.data.as_ref().unwrap();
        assert_eq!(data["mappings"][0]["confidence"], "unmapped");
        assert_eq!(data["unmapped_users"].as_array().unwrap().len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn name_match_is_low_confidence() {
        let input = json!({
            "source_users": [source("a-user", None, "Grace Hopper")],
            "destination_users": [destination("ghopper", None, "Grace Hopper")],
        });
        let outcome = map_users(&input);
        let mapping = &outcome.data.as_ref().unwrap()["mappings"][0];
        assert_eq!(mapping["confidence"], "low");
        assert_eq!(mapping["method"], "name");
    }

    #[test]
    fn org_members_are_deduplicated() {
        let input = json!({
            "source_users": [source("dev", None, "")],
            "destination_users": [destination("dev", None, "")],
            "org_members": [destination("dev", None, "")],
        });
        let outcome = map_users(&input);
        assert_eq!(outcome.metadata["medium_confidence"], 1);
    }

    #[test]
    fn stats_add_up() {
        let input = json!({
            "source_users": [
                source("a", Some("a@x.com"), "A"),
                source("b", None, "B"),
            ],
            "destination_users": [destination("a", Some("a@x.com"), "A")],
        });
        let outcome = map_users(&input);
        let stats = &outcome.data.as_ref().unwrap()["stats"];
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["high_confidence"], 1);
        assert_eq!(stats["unmapped"], 1);
    }
}
