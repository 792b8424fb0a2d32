//! Discovery configuration

use forgeshift_core::{Error, Result};
use forgeshift_llm::LlmSettings;

pub const DEFAULT_MAX_API_CALLS: u64 = 5_000;
pub const DEFAULT_MAX_PER_PROJECT_CALLS: u64 = 200;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DEEP_TOP_N: usize = 20;
pub const DEFAULT_PARALLEL_WORKERS: usize = 4;

/// What the run scans: one project, one group tree, or everything the
/// token can see.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanMode {
    SingleProject(String),
    RootGroup(String),
    DiscoverAll,
}

#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub base_url: String,
    pub token: String,
    pub root_group: Option<String>,
    pub project_path: Option<String>,
    pub output_dir: String,
    pub max_api_calls: u64,
    pub max_per_project_calls: u64,
    pub timeout_secs: u64,
    pub verify_ssl: bool,
    pub deep: bool,
    pub deep_top_n: usize,
    pub parallel_workers: usize,
    pub ai_enabled: bool,
    pub llm: LlmSettings,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            root_group: None,
            project_path: None,
            output_dir: "./output".to_string(),
            max_api_calls: DEFAULT_MAX_API_CALLS,
            max_per_project_calls: DEFAULT_MAX_PER_PROJECT_CALLS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verify_ssl: true,
            deep: false,
            deep_top_n: DEFAULT_DEEP_TOP_N,
            parallel_workers: DEFAULT_PARALLEL_WORKERS,
            ai_enabled: false,
            llm: LlmSettings::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Validate and normalize: the base URL loses its trailing slash,
    /// empty selector strings collapse to "scan everything".
    pub fn normalized(mut self) -> Result<Self> {
        if self.base_url.is_empty() {
            return Err(Error::validation("base_url is required"));
        }
        if self.token.is_empty() {
            return Err(Error::validation("token is required"));
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        if matches!(self.root_group.as_deref(), Some("")) {
            self.root_group = None;
        }
        if matches!(self.project_path.as_deref(), Some("")) {
            self.project_path = None;
        }
        Ok(self)
    }

    /// Fill unset fields from the environment.
    pub fn with_env_defaults(mut self) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        if self.base_url.is_empty() {
            if let Some(v) = env("GITLAB_BASE_URL") {
                self.base_url = v;
            }
        }
        if self.token.is_empty() {
            if let Some(v) = env("GITLAB_TOKEN") {
                self.token = v;
            }
        }
        if self.root_group.is_none() {
            self.root_group = env("GITLAB_ROOT_GROUP");
        }
        if self.project_path.is_none() {
            self.project_path = env("GITLAB_PROJECT");
        }
        if let Some(v) = env("DISCOVERY_PARALLEL_WORKERS").and_then(|v| v.parse().ok()) {
            self.parallel_workers = v;
        }
        if !self.ai_enabled {
            self.ai_enabled = env("ENABLE_AI_ANALYSIS")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false);
        }
        self
    }

    /// A project path wins over a root group; no selector scans all
    /// accessible groups.
    pub fn scan_mode(&self) -> ScanMode {
        if let Some(project) = &self.project_path {
            ScanMode::SingleProject(project.clone())
        } else if let Some(group) = &self.root_group {
            ScanMode::RootGroup(group.clone())
        } else {
            ScanMode::DiscoverAll
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_slash_and_empty_selectors() {
        let config = DiscoveryConfig {
            base_url: "https://gitlab.example.com/".to_string(),
            token: "t".to_string(),
            root_group: Some(String::new()),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(config.base_url, "https://gitlab.example.com");
        assert_eq!(config.root_group, None);
        assert_eq!(config.scan_mode(), ScanMode::DiscoverAll);
    }

    #[test]
    fn project_path_wins_over_root_group() {
        let config = DiscoveryConfig {
            base_url: "https://gitlab.example.com".to_string(),
            token: "t".to_string(),
            root_group: Some("acme".to_string()),
            project_path: Some("acme/api".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.scan_mode(),
            ScanMode::SingleProject("acme/api".to_string())
        );
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let err = DiscoveryConfig {
            base_url: "https://gitlab.example.com".to_string(),
            ..Default::default()
        }
        .normalized()
        .unwrap_err();
        assert!(err.to_string().contains("token"));
    }
}
