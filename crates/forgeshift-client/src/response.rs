//! Response wrapper with forge pagination header accessors

use serde_json::Value;
use std::collections::HashMap;

/// A terminal HTTP response: status, parsed body, and lowercased headers.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    headers: HashMap<String, String>,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value, headers: HashMap<String, String>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            status,
            body,
            headers,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    fn header_u64(&self, name: &str) -> Option<u64> {
        self.header(name).and_then(|v| v.parse().ok())
    }

    /// Next page number from the source forge's pagination headers.
    pub fn next_page(&self) -> Option<u64> {
        match self.header("x-next-page") {
            Some("") | None => None,
            Some(v) => v.parse().ok(),
        }
    }

    pub fn total_items(&self) -> Option<u64> {
        self.header_u64("x-total")
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.header_u64("x-total-pages")
    }

    /// `Retry-After` in seconds, when present and numeric.
    pub fn retry_after(&self) -> Option<u64> {
        self.header_u64("retry-after")
    }

    /// Body as a string when the response was not JSON.
    pub fn text(&self) -> String {
        match &self.body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resp(status: u16, headers: &[(&str, &str)]) -> ApiResponse {
        ApiResponse::new(
            status,
            json!([]),
            headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn success_range() {
        assert!(resp(200, &[]).is_success());
        assert!(resp(299, &[]).is_success());
        assert!(!resp(404, &[]).is_success());
    }

    #[test]
    fn next_page_handles_case_and_empty() {
        assert_eq!(resp(200, &[("X-Next-Page", "3")]).next_page(), Some(3));
        assert_eq!(resp(200, &[("x-next-page", "2")]).next_page(), Some(2));
        assert_eq!(resp(200, &[("X-Next-Page", "")]).next_page(), None);
        assert_eq!(resp(200, &[]).next_page(), None);
    }

    #[test]
    fn totals_parse() {
        let r = resp(200, &[("X-Total", "137"), ("X-Total-Pages", "7")]);
        assert_eq!(r.total_items(), Some(137));
        assert_eq!(r.total_pages(), Some(7));
    }

    #[test]
    fn retry_after_numeric_only() {
        assert_eq!(resp(429, &[("Retry-After", "12")]).retry_after(), Some(12));
        assert_eq!(resp(429, &[("Retry-After", "soon")]).retry_after(), None);
    }
}
