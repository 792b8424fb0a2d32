//! Destination forge client: full verb set with typed helpers for apply

use crate::response::ApiResponse;
use crate::stats::CallStats;
use forgeshift_core::{redact_secrets, Error, Result};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_UPLOADS_URL: &str = "https://uploads.github.com";
const DEFAULT_MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: f64 = 1.0;
const MAX_BACKOFF_SECS: f64 = 60.0;

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    uploads_url: String,
    max_retries: u32,
    stats: Arc<CallStats>,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    pub fn with_base_url(token: &str, api_url: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::auth("token contains invalid header characters"))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = reqwest::Client::builder()
            .user_agent("forgeshift/0.1.0")
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            uploads_url: DEFAULT_UPLOADS_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            stats: Arc::new(CallStats::new()),
        })
    }

    pub fn with_uploads_url(mut self, url: &str) -> Self {
        self.uploads_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn stats(&self) -> Arc<CallStats> {
        self.stats.clone()
    }

    /// Dispatch a request with retry on 429/5xx. Terminal responses are
    /// returned for the caller to interpret.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.api_url, path)
        };
        let mut last_transport: Option<String> = None;

        for attempt in 0..self.max_retries {
            self.stats.record_attempt();
            debug!(method = %method, url = %url, attempt = attempt + 1, "dispatch");

            let mut request = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
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
                    let parsed = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    let api_response = ApiResponse::new(status, parsed, headers);

                    if (status == 429 || (500..600).contains(&status))
                        && attempt < self.max_retries - 1
                    {
                        let backoff = match api_response.retry_after() {
                            Some(ra) => Duration::from_secs(ra.min(MAX_BACKOFF_SECS as u64)),
                            None => Duration::from_secs_f64(
                                (BASE_BACKOFF_SECS * 2f64.powi(attempt as i32))
                                    .min(MAX_BACKOFF_SECS),
                            ),
                        };
                        self.stats.record_retry();
                        warn!(status, backoff_secs = backoff.as_secs_f64(), "retrying");
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
                        tokio::time::sleep(Duration::from_secs_f64(
                            BASE_BACKOFF_SECS * 2f64.powi(attempt as i32),
                        ))
                        .await;
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

    fn ensure_success(response: ApiResponse, step: &str) -> Result<Value> {
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(Error::from_status(
                response.status,
                step,
                redact_secrets(&response.text()),
            ))
        }
    }

    /// Resolve the authenticated user; the destination-side health check.
    pub async fn health_check(&self) -> Result<Value> {
        let response = self.request(Method::GET, "/user", None).await?;
        Self::ensure_success(response, "health_check")
    }

    // --- repositories ---

    pub async fn get_repo(&self, full_name: &str) -> Result<ApiResponse> {
        self.request(Method::GET, &format!("/repos/{full_name}"), None)
            .await
    }

    /// Create a repository under an organization, or under the
    /// authenticated user when `org` is absent or unknown.
    pub async fn create_repo(&self, org: Option<&str>, payload: &Value) -> Result<Value> {
        if let Some(org) = org {
            let response = self
                .request(Method::POST, &format!("/orgs/{org}/repos"), Some(payload))
                .await?;
            if response.status != 404 {
                return Self::ensure_success(response, "repo_create");
            }
            // Fall through: the name was a user, not an organization.
        }
        let response = self
            .request(Method::POST, "/user/repos", Some(payload))
            .await?;
        Self::ensure_success(response, "repo_create")
    }

    pub async fn update_repo(&self, full_name: &str, payload: &Value) -> Result<Value> {
        let response = self
            .request(Method::PATCH, &format!("/repos/{full_name}"), Some(payload))
            .await?;
        Self::ensure_success(response, "repo_configure")
    }

    pub async fn delete_repo(&self, full_name: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/repos/{full_name}"), None)
            .await?;
        if response.is_success() || response.status == 404 {
            Ok(())
        } else {
            Err(Error::from_status(
                response.status,
                "repo_delete",
                response.text(),
            ))
        }
    }

    /// Create or update a file through the contents API.
    pub async fn put_contents(
        &self,
        full_name: &str,
        path: &str,
        message: &str,
        content_base64: &str,
        branch: Option<&str>,
    ) -> Result<Value> {
        let mut payload = json!({
            "message": message,
            "content": content_base64,
        });
        if let Some(branch) = branch {
            payload["branch"] = json!(branch);
        }
        // Updating an existing file needs its blob sha.
        let existing = self
            .request(
                Method::GET,
                &format!("/repos/{full_name}/contents/{path}"),
                None,
            )
            .await?;
        if existing.is_success() {
            if let Some(sha) = existing.body.get("sha").and_then(|v| v.as_str()) {
                payload["sha"] = json!(sha);
            }
        }
        let response = self
            .request(
                Method::PUT,
                &format!("/repos/{full_name}/contents/{path}"),
                Some(&payload),
            )
            .await?;
        Self::ensure_success(response, "contents_put")
    }

    // --- issues ---

    pub async fn create_issue(&self, full_name: &str, payload: &Value) -> Result<Value> {
        let response = self
            .request(
                Method::POST,
                &format!("/repos/{full_name}/issues"),
                Some(payload),
            )
            .await?;
        Self::ensure_success(response, "issue_create")
    }

    pub async fn create_issue_comment(
        &self,
        full_name: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<Value> {
        let response = self
            .request(
                Method::POST,
                &format!("/repos/{full_name}/issues/{issue_number}/comments"),
                Some(&json!({ "body": body })),
            )
            .await?;
        Self::ensure_success(response, "issue_comment_add")
    }

    pub async fn list_issues(&self, full_name: &str, state: &str) -> Result<Vec<Value>> {
        let response = self
            .request(
                Method::GET,
                &format!("/repos/{full_name}/issues?state={state}&per_page=100"),
                None,
            )
            .await?;
        let body = Self::ensure_success(response, "issue_list")?;
        Ok(body.as_array().cloned().unwrap_or_default())
    }

    pub async fn get_label(&self, full_name: &str, name: &str) -> Result<ApiResponse> {
        self.request(
            Method::GET,
            &format!("/repos/{full_name}/labels/{}", urlencoding::encode(name)),
            None,
        )
        .await
    }

    // --- pull requests ---

    pub async fn create_pull(&self, full_name: &str, payload: &Value) -> Result<ApiResponse> {
        self.request(
            Method::POST,
            &format!("/repos/{full_name}/pulls"),
            Some(payload),
        )
        .await
    }

    // --- releases ---

    pub async fn create_release(&self, full_name: &str, payload: &Value) -> Result<Value> {
        let response = self
            .request(
                Method::POST,
                &format!("/repos/{full_name}/releases"),
                Some(payload),
            )
            .await?;
        Self::ensure_success(response, "release_create")
    }

    pub async fn delete_release(&self, full_name: &str, release_id: u64) -> Result<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/repos/{full_name}/releases/{release_id}"),
                None,
            )
            .await?;
        if response.is_success() || response.status == 404 {
            Ok(())
        } else {
            Err(Error::from_status(
                response.status,
                "release_delete",
                response.text(),
            ))
        }
    }

    pub async fn upload_release_asset(
        &self,
        full_name: &str,
        release_id: u64,
        asset_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value> {
        let url = format!(
            "{}/repos/{full_name}/releases/{release_id}/assets?name={}",
            self.uploads_url,
            urlencoding::encode(asset_name)
        );
        self.stats.record_attempt();
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::transport(redact_secrets(&e.to_string())))?;
        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if (200..300).contains(&status) {
            self.stats.record_success();
            Ok(body)
        } else {
            self.stats.record_failure();
            Err(Error::from_status(
                status,
                "release_asset_upload",
                body.to_string(),
            ))
        }
    }

    // --- settings ---

    pub async fn put_branch_protection(
        &self,
        full_name: &str,
        branch: &str,
        payload: &Value,
    ) -> Result<Value> {
        let response = self
            .request(
                Method::PUT,
                &format!(
                    "/repos/{full_name}/branches/{}/protection",
                    urlencoding::encode(branch)
                ),
                Some(payload),
            )
            .await?;
        Self::ensure_success(response, "protection_set")
    }

    pub async fn add_collaborator(
        &self,
        full_name: &str,
        username: &str,
        permission: &str,
    ) -> Result<ApiResponse> {
        self.request(
            Method::PUT,
            &format!("/repos/{full_name}/collaborators/{username}"),
            Some(&json!({ "permission": permission })),
        )
        .await
    }

    pub async fn remove_collaborator(&self, full_name: &str, username: &str) -> Result<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/repos/{full_name}/collaborators/{username}"),
                None,
            )
            .await?;
        if response.is_success() || response.status == 404 {
            Ok(())
        } else {
            Err(Error::from_status(
                response.status,
                "collaborator_remove",
                response.text(),
            ))
        }
    }

    pub async fn create_hook(&self, full_name: &str, payload: &Value) -> Result<Value> {
        let response = self
            .request(
                Method::POST,
                &format!("/repos/{full_name}/hooks"),
                Some(payload),
            )
            .await?;
        Self::ensure_success(response, "webhook_create")
    }

    pub async fn delete_hook(&self, full_name: &str, hook_id: u64) -> Result<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/repos/{full_name}/hooks/{hook_id}"),
                None,
            )
            .await?;
        if response.is_success() || response.status == 404 {
            Ok(())
        } else {
            Err(Error::from_status(
                response.status,
                "webhook_delete",
                response.text(),
            ))
        }
    }

    pub async fn create_environment(&self, full_name: &str, name: &str) -> Result<Value> {
        let response = self
            .request(
                Method::PUT,
                &format!(
                    "/repos/{full_name}/environments/{}",
                    urlencoding::encode(name)
                ),
                Some(&json!({})),
            )
            .await?;
        Self::ensure_success(response, "environment_create")
    }

    pub async fn create_actions_variable(
        &self,
        full_name: &str,
        name: &str,
        value: &str,
    ) -> Result<Value> {
        let response = self
            .request(
                Method::POST,
                &format!("/repos/{full_name}/actions/variables"),
                Some(&json!({ "name": name, "value": value })),
            )
            .await?;
        Self::ensure_success(response, "variable_set")
    }
}
