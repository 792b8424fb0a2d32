//! Source forge client: GET-only, paginated, retrying
//!
//! Discovery and export never issue write verbs against the source; the
//! client enforces that by construction.

use crate::rate_limit::RateGate;
use crate::response::ApiResponse;
use crate::stats::CallStats;
use forgeshift_core::{redact_secrets, Error, Result};
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 5;
const BASE_BACKOFF_SECS: f64 = 1.0;
const MAX_BACKOFF_SECS: f64 = 60.0;
pub const DEFAULT_PER_PAGE: u32 = 100;

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub timeout_secs: u64,
    pub verify_ssl: bool,
    pub max_retries: u32,
    pub max_requests_per_minute: Option<u32>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verify_ssl: true,
            max_retries: DEFAULT_MAX_RETRIES,
            max_requests_per_minute: None,
        }
    }
}

pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    stats: Arc<CallStats>,
    gate: RateGate,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: &str, options: ClientOptions) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut token_value = reqwest::header::HeaderValue::from_str(token)
            .map_err(|_| Error::auth("token contains invalid header characters"))?;
        token_value.set_sensitive(true);
        headers.insert("PRIVATE-TOKEN", token_value);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .user_agent("forgeshift/0.1.0")
            .default_headers(headers)
            .timeout(Duration::from_secs(options.timeout_secs))
            .danger_accept_invalid_certs(!options.verify_ssl)
            .build()
            .map_err(|e| Error::transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: options.max_retries.max(1),
            stats: Arc::new(CallStats::new()),
            gate: RateGate::new(options.max_requests_per_minute),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> Arc<CallStats> {
        self.stats.clone()
    }

    /// URL-encode a group or project path for use as an API id.
    pub fn encode_path(path: &str) -> String {
        urlencoding::encode(path).into_owned()
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        format!("{}{path}", self.base_url)
    }

    fn backoff(attempt: u32, retry_after: Option<u64>) -> Duration {
        let secs = match retry_after {
            Some(ra) => (ra as f64).min(MAX_BACKOFF_SECS),
            None => (BASE_BACKOFF_SECS * 2f64.powi(attempt as i32)).min(MAX_BACKOFF_SECS),
        };
        Duration::from_secs_f64(secs)
    }

    fn should_retry(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }

    /// Issue a GET with retry and backoff. Terminal 4xx responses are
    /// returned (not raised) so callers can map them per step; only
    /// transport failures after all retries become errors.
    pub async fn get(&self, path: &str, params: &[(String, String)]) -> Result<ApiResponse> {
        let url = self.build_url(path);
        let mut last_transport: Option<String> = None;

        for attempt in 0..self.max_retries {
            self.gate.acquire().await;
            self.stats.record_attempt();
            debug!(url = %url, attempt = attempt + 1, "GET");

            let outcome = self.http.get(&url).query(params).send().await;
            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let headers: HashMap<String, String> = response
                        .headers()
                        .iter()
                        .map(|(k, v)| {
                            (k.as_str().to_string(), v.to_str().unwrap_or("").to_string())
                        })
                        .collect();
                    let text = response
                        .text()
                        .await
                        .map_err(|e| Error::transport(redact_secrets(&e.to_string())))?;
                    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    let api_response = ApiResponse::new(status, body, headers);

                    if Self::should_retry(status) && attempt < self.max_retries - 1 {
                        let retry_after = api_response.retry_after();
                        if let Some(ra) = retry_after {
                            self.gate.hold_for(Duration::from_secs(ra)).await;
                        }
                        let backoff = Self::backoff(attempt, retry_after);
                        self.stats.record_retry();
                        warn!(
                            status,
                            backoff_secs = backoff.as_secs_f64(),
                            attempt = attempt + 1,
                            max = self.max_retries,
                            "retryable response, backing off"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if status < 400 {
                        self.stats.record_success();
                    } else {
                        self.stats.record_failure();
                    }
                    return Ok(api_response);
                }
                Err(e) => {
                    let message = redact_secrets(&e.to_string());
                    last_transport = Some(message.clone());
                    self.stats.record_retry();
                    if attempt < self.max_retries - 1 {
                        let backoff = Self::backoff(attempt, None);
                        warn!(error = %message, backoff_secs = backoff.as_secs_f64(), "request error, retrying");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        self.stats.record_failure();
        Err(Error::transport(format!(
            "request failed after {} retries: {}",
            self.max_retries,
            last_transport.unwrap_or_else(|| "unknown transport error".to_string())
        )))
    }

    /// Paginate a list endpoint following `X-Next-Page`, yielding items
    /// until the pages run out or `max_items` is reached.
    pub fn paginate<'a>(
        &'a self,
        path: &str,
        params: &[(String, String)],
        per_page: u32,
        max_items: Option<usize>,
    ) -> impl Stream<Item = Result<Value>> + 'a {
        let path = path.to_string();
        let base_params: Vec<(String, String)> = params.to_vec();
        let per_page = per_page.min(DEFAULT_PER_PAGE).max(1);

        async_stream::try_stream! {
            let mut page: u64 = 1;
            let mut fetched: usize = 0;

            loop {
                let mut params = base_params.clone();
                params.push(("per_page".to_string(), per_page.to_string()));
                params.push(("page".to_string(), page.to_string()));

                let response = self.get(&path, &params).await?;
                if !response.is_success() {
                    warn!(path = %path, page, status = response.status, "pagination stopped on error response");
                    break;
                }

                match &response.body {
                    Value::Array(items) => {
                        for item in items {
                            yield item.clone();
                            fetched += 1;
                            if let Some(max) = max_items {
                                if fetched >= max {
                                    return;
                                }
                            }
                        }
                    }
                    other => {
                        // Non-list payloads are a single logical item.
                        yield other.clone();
                        break;
                    }
                }

                match response.next_page() {
                    Some(next) => page = next,
                    None => break,
                }
            }
        }
    }

    /// Count items behind a list endpoint: `X-Total` when available,
    /// otherwise a bounded `per_page=1` walk. Returns `(count, is_exact)`.
    pub async fn paginated_count(
        &self,
        path: &str,
        params: &[(String, String)],
        max_count: Option<usize>,
    ) -> Result<(u64, bool)> {
        let mut probe = params.to_vec();
        probe.push(("per_page".to_string(), "1".to_string()));
        probe.push(("page".to_string(), "1".to_string()));

        let response = self.get(path, &probe).await?;
        if !response.is_success() {
            return Ok((0, true));
        }
        if let Some(total) = response.total_items() {
            return Ok((total, true));
        }

        use futures::StreamExt;
        let mut count: u64 = 0;
        let stream = self.paginate(path, params, 1, max_count);
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            item?;
            count += 1;
        }

        let is_exact = match max_count {
            Some(max) => (count as usize) < max,
            None => true,
        };
        Ok((count, is_exact))
    }
}
