//! Defensive JSON extraction from model output

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("valid regex"))
}

/// Pull a JSON object out of free-form model text: a fenced code block
/// first, then the first balanced `{…}` span. Returns `None` when
/// nothing parses.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(captures) = fenced_block().captures(text) {
        if let Ok(value) = serde_json::from_str(&captures[1]) {
            return Some(value);
        }
    }
    first_balanced_object(text).and_then(|span| serde_json::from_str(span).ok())
}

/// First `{…}` span with balanced braces, string-aware.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
