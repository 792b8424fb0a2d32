//! Fact and enrichment probes over the source forge API
//!
//! Every probe is read-only. Hard failures come back as `StepError`
//! so the executor can attach them to the project; soft outcomes
//! (file absent, permission refused) map to domain values.

use forgeshift_client::GitLabClient;
use forgeshift_core::{Count, Detection, IssueCounts, MrCounts, StepError};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Counting ceiling when `X-Total` is unavailable in light mode.
pub const LIGHT_MODE_LIMIT: usize = 1_000;
/// Absolute ceiling for any fallback count walk.
pub const MAX_COUNT_ITEMS: usize = 10_000;

#[derive(Clone, Debug)]
pub struct HealthReport {
    pub ok: bool,
    pub version: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct GroupInfo {
    pub id: u64,
    pub full_path: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct ProjectInfo {
    pub id: u64,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
    pub archived: bool,
    pub visibility: String,
    pub wiki_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct TreeEntry {
    pub name: String,
    pub kind: String,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct CiSample {
    pub content: String,
    pub truncated: bool,
    pub total_lines: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ContainerHints {
    pub has_dockerfile: Detection,
    pub has_compose: Detection,
    pub has_k8s: Detection,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectFeatures {
    pub container_registry_enabled: bool,
    pub packages_enabled: bool,
    pub wiki_enabled: bool,
    pub pages_access_level: String,
    pub lfs_enabled: bool,
}

pub struct GitLabTools {
    client: Arc<GitLabClient>,
}

impl GitLabTools {
    pub fn new(client: Arc<GitLabClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<GitLabClient> {
        &self.client
    }

    fn step_err(step: &str, status: Option<u16>, message: impl Into<String>) -> StepError {
        StepError::new(step, message, status)
    }

    fn project_api_path(project: &str) -> String {
        if project.chars().all(|c| c.is_ascii_digit()) {
            format!("/api/v4/projects/{project}")
        } else {
            format!("/api/v4/projects/{}", GitLabClient::encode_path(project))
        }
    }

    /// Probe instance health and version. An unavailable version
    /// endpoint with a working API still passes.
    pub async fn health_check(&self) -> Result<HealthReport, StepError> {
        let response = self
            .client
            .get("/api/v4/version", &[])
            .await
            .map_err(|e| Self::step_err("health_check", None, e.to_string()))?;

        match response.status {
            200 => {
                let version = response.body["version"].as_str().map(String::from);
                let revision = response.body["revision"].as_str().unwrap_or("unknown");
                Ok(HealthReport {
                    ok: true,
                    message: format!(
                        "forge {} ({revision})",
                        version.as_deref().unwrap_or("unknown")
                    ),
                    version,
                })
            }
            401 => Err(Self::step_err(
                "health_check",
                Some(401),
                "invalid or missing token",
            )),
            _ => Ok(HealthReport {
                ok: true,
                version: None,
                message: "version endpoint unavailable, but API accessible".to_string(),
            }),
        }
    }

    /// Resolve a group path or numeric id to its id.
    pub async fn resolve_group(&self, group: &str) -> Result<u64, StepError> {
        let path = if group.chars().all(|c| c.is_ascii_digit()) {
            format!("/api/v4/groups/{group}")
        } else {
            format!("/api/v4/groups/{}", GitLabClient::encode_path(group))
        };
        let response = self
            .client
            .get(&path, &[])
            .await
            .map_err(|e| Self::step_err("resolve_group", None, e.to_string()))?;

        if response.status == 200 {
            response.body["id"].as_u64().ok_or_else(|| {
                Self::step_err("resolve_group", Some(200), "group payload missing id")
            })
        } else {
            Err(Self::step_err(
                "resolve_group",
                Some(response.status),
                format!("group '{group}' not found"),
            ))
        }
    }

    /// Resolve a project path or id to its trimmed record.
    pub async fn resolve_project(&self, project: &str) -> Result<ProjectInfo, StepError> {
        let response = self
            .client
            .get(&Self::project_api_path(project), &[])
            .await
            .map_err(|e| Self::step_err("resolve_project", None, e.to_string()))?;

        if response.status != 200 {
            return Err(Self::step_err(
                "resolve_project",
                Some(response.status),
                format!("project '{project}' not found"),
            ));
        }
        let body = &response.body;
        Ok(ProjectInfo {
            id: body["id"].as_u64().unwrap_or_default(),
            path_with_namespace: body["path_with_namespace"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            default_branch: body["default_branch"].as_str().map(String::from),
            archived: body["archived"].as_bool().unwrap_or(false),
            visibility: body["visibility"].as_str().unwrap_or("private").to_string(),
            wiki_enabled: body["wiki_enabled"].as_bool().unwrap_or(false),
        })
    }

    /// Full project payload (used by export for settings and URLs).
    pub async fn get_project(&self, project: &str) -> Result<Value, StepError> {
        let response = self
            .client
            .get(&Self::project_api_path(project), &[])
            .await
            .map_err(|e| Self::step_err("get_project", None, e.to_string()))?;
        if response.status == 200 {
            Ok(response.body)
        } else {
            Err(Self::step_err(
                "get_project",
                Some(response.status),
                format!("project '{project}' not found"),
            ))
        }
    }

    /// List accessible top-level groups, sorted by full path.
    pub async fn list_all_groups(&self) -> Result<Vec<GroupInfo>, StepError> {
        let params = vec![
            ("all_available".to_string(), "false".to_string()),
            ("top_level_only".to_string(), "true".to_string()),
        ];
        let groups = self
            .collect_groups("/api/v4/groups", &params, "list_all_groups")
            .await?;
        info!(count = groups.len(), "discovered accessible top-level groups");
        Ok(groups)
    }

    /// List direct subgroups of a group, sorted by full path.
    pub async fn list_subgroups(&self, group_id: u64) -> Result<Vec<GroupInfo>, StepError> {
        let params = vec![("all_available".to_string(), "false".to_string())];
        self.collect_groups(
            &format!("/api/v4/groups/{group_id}/subgroups"),
            &params,
            "list_subgroups",
        )
        .await
    }

    async fn collect_groups(
        &self,
        path: &str,
        params: &[(String, String)],
        step: &str,
    ) -> Result<Vec<GroupInfo>, StepError> {
        let mut groups = Vec::new();
        let stream = self.client.paginate(path, params, 100, None);
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            let item = item.map_err(|e| Self::step_err(step, None, e.to_string()))?;
            if let Some(id) = item["id"].as_u64() {
                groups.push(GroupInfo {
                    id,
                    full_path: item["full_path"].as_str().unwrap_or_default().to_string(),
                    name: item["name"].as_str().unwrap_or_default().to_string(),
                });
            }
        }
        groups.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        Ok(groups)
    }

    /// List a group's direct projects, sorted by path.
    pub async fn list_projects(&self, group_id: u64) -> Result<Vec<ProjectInfo>, StepError> {
        let params = vec![("include_subgroups".to_string(), "false".to_string())];
        let mut projects = Vec::new();
        let stream = self.client.paginate(
            &format!("/api/v4/groups/{group_id}/projects"),
            &params,
            100,
            None,
        );
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            let item = item.map_err(|e| Self::step_err("list_projects", None, e.to_string()))?;
            if let Some(id) = item["id"].as_u64() {
                projects.push(ProjectInfo {
                    id,
                    path_with_namespace: item["path_with_namespace"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    default_branch: item["default_branch"].as_str().map(String::from),
                    archived: item["archived"].as_bool().unwrap_or(false),
                    visibility: item["visibility"].as_str().unwrap_or("private").to_string(),
                    wiki_enabled: item["wiki_enabled"].as_bool().unwrap_or(false),
                });
            }
        }
        projects.sort_by(|a, b| a.path_with_namespace.cmp(&b.path_with_namespace));
        Ok(projects)
    }

    /// Fetch a repository file as raw text. `Ok(None)` means absent.
    pub async fn get_file(
        &self,
        project_id: u64,
        file_path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>, StepError> {
        let encoded = GitLabClient::encode_path(file_path);
        let path = format!("/api/v4/projects/{project_id}/repository/files/{encoded}/raw");
        let mut params = Vec::new();
        if let Some(git_ref) = git_ref {
            params.push(("ref".to_string(), git_ref.to_string()));
        }
        let response = self
            .client
            .get(&path, &params)
            .await
            .map_err(|e| Self::step_err("get_file", None, e.to_string()))?;

        match response.status {
            200 => Ok(Some(response.text())),
            404 => Ok(None),
            status => Err(Self::step_err(
                "get_file",
                Some(status),
                format!("failed to read '{file_path}': HTTP {status}"),
            )),
        }
    }

    /// Root-level repository tree listing.
    pub async fn get_tree(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
    ) -> Result<Vec<TreeEntry>, StepError> {
        let mut params = Vec::new();
        if let Some(git_ref) = git_ref {
            params.push(("ref".to_string(), git_ref.to_string()));
        }
        let mut entries = Vec::new();
        let stream = self.client.paginate(
            &format!("/api/v4/projects/{project_id}/repository/tree"),
            &params,
            100,
            None,
        );
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            let item = item.map_err(|e| Self::step_err("get_tree", None, e.to_string()))?;
            entries.push(TreeEntry {
                name: item["name"].as_str().unwrap_or_default().to_string(),
                kind: item["type"].as_str().unwrap_or_default().to_string(),
                path: item["path"].as_str().unwrap_or_default().to_string(),
            });
        }
        Ok(entries)
    }

    /// Does the project carry a CI configuration file?
    pub async fn detect_ci(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
    ) -> (Detection, Option<StepError>) {
        match self.get_file(project_id, ".gitlab-ci.yml", git_ref).await {
            Ok(Some(_)) => (Detection::Yes, None),
            Ok(None) => (Detection::No, None),
            Err(e) => {
                let e = StepError::new("detect_ci", e.message, e.status);
                (Detection::Unknown, Some(e))
            }
        }
    }

    /// LFS usage: an existing `.gitattributes` decides via its filter
    /// lines; a missing file defers to the project's LFS flag.
    pub async fn detect_lfs(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
    ) -> (Detection, Option<StepError>) {
        match self.get_file(project_id, ".gitattributes", git_ref).await {
            Ok(Some(content)) => (content.contains("filter=lfs").into(), None),
            Ok(None) => match self.get_project(&project_id.to_string()).await {
                Ok(project) => (
                    project["lfs_enabled"].as_bool().unwrap_or(false).into(),
                    None,
                ),
                // No file and no readable flag: nothing suggests LFS.
                Err(_) => (Detection::No, None),
            },
            Err(read_err) => match self.get_project(&project_id.to_string()).await {
                Ok(project) => (
                    project["lfs_enabled"].as_bool().unwrap_or(false).into(),
                    None,
                ),
                Err(_) => {
                    let e = StepError::new("detect_lfs", read_err.message, read_err.status);
                    (Detection::Unknown, Some(e))
                }
            },
        }
    }

    /// MR counts per state. Light mode caps enumeration and reports
    /// `>N` on truncation.
    pub async fn mr_counts(&self, project_id: u64) -> Result<MrCounts, StepError> {
        let base = format!("/api/v4/projects/{project_id}/merge_requests");
        let mut open = Count::Exact(0);
        let mut merged = Count::Exact(0);
        let mut closed = Count::Exact(0);
        let mut total: u64 = 0;
        let mut exceeded = false;

        for state in ["opened", "merged", "closed"] {
            let params = vec![("state".to_string(), state.to_string())];
            let (count, is_exact) = self
                .client
                .paginated_count(&base, &params, Some(LIGHT_MODE_LIMIT))
                .await
                .map_err(|e| Self::step_err("get_mr_counts", None, e.to_string()))?;
            let value = if is_exact {
                Count::Exact(count)
            } else {
                exceeded = true;
                Count::AtLeast(count)
            };
            match state {
                "opened" => open = value,
                "merged" => merged = value,
                _ => closed = value,
            }
            total += count;
        }

        Ok(MrCounts::Known {
            open,
            merged,
            closed,
            total: if exceeded {
                Count::AtLeast(total)
            } else {
                Count::Exact(total)
            },
        })
    }

    /// Issue counts per state, same light-mode rules as MRs.
    pub async fn issue_counts(&self, project_id: u64) -> Result<IssueCounts, StepError> {
        let base = format!("/api/v4/projects/{project_id}/issues");
        let mut open = Count::Exact(0);
        let mut closed = Count::Exact(0);
        let mut total: u64 = 0;
        let mut exceeded = false;

        for state in ["opened", "closed"] {
            let params = vec![("state".to_string(), state.to_string())];
            let (count, is_exact) = self
                .client
                .paginated_count(&base, &params, Some(LIGHT_MODE_LIMIT))
                .await
                .map_err(|e| Self::step_err("get_issue_counts", None, e.to_string()))?;
            let value = if is_exact {
                Count::Exact(count)
            } else {
                exceeded = true;
                Count::AtLeast(count)
            };
            if state == "opened" {
                open = value;
            } else {
                closed = value;
            }
            total += count;
        }

        Ok(IssueCounts::Known {
            open,
            closed,
            total: if exceeded {
                Count::AtLeast(total)
            } else {
                Count::Exact(total)
            },
        })
    }

    /// Count behind a list endpoint using `X-Total`, with a bounded
    /// fallback walk. 404 counts as zero (empty repository and similar).
    async fn header_count(
        &self,
        path: &str,
        step: &'static str,
        fallback_max: usize,
    ) -> Result<Count, StepError> {
        let probe = vec![
            ("per_page".to_string(), "1".to_string()),
            ("page".to_string(), "1".to_string()),
        ];
        let response = self
            .client
            .get(path, &probe)
            .await
            .map_err(|e| Self::step_err(step, None, e.to_string()))?;

        match response.status {
            200 => {
                if let Some(total) = response.total_items() {
                    return Ok(Count::Exact(total));
                }
                let (count, is_exact) = self
                    .client
                    .paginated_count(path, &[], Some(fallback_max))
                    .await
                    .map_err(|e| Self::step_err(step, None, e.to_string()))?;
                Ok(if is_exact {
                    Count::Exact(count)
                } else {
                    Count::AtLeast(count)
                })
            }
            404 => Ok(Count::Exact(0)),
            status => Err(Self::step_err(step, Some(status), format!("HTTP {status}"))),
        }
    }

    pub async fn branches_count(&self, project_id: u64) -> Result<Count, StepError> {
        self.header_count(
            &format!("/api/v4/projects/{project_id}/repository/branches"),
            "get_branches_count",
            500,
        )
        .await
    }

    pub async fn tags_count(&self, project_id: u64) -> Result<Count, StepError> {
        self.header_count(
            &format!("/api/v4/projects/{project_id}/repository/tags"),
            "get_tags_count",
            500,
        )
        .await
    }

    pub async fn protected_branches_count(&self, project_id: u64) -> Result<Count, StepError> {
        self.header_count(
            &format!("/api/v4/projects/{project_id}/protected_branches"),
            "get_protected_branches_count",
            100,
        )
        .await
    }

    pub async fn project_variables_count(&self, project_id: u64) -> Result<Count, StepError> {
        self.header_count(
            &format!("/api/v4/projects/{project_id}/variables"),
            "get_project_variables_count",
            100,
        )
        .await
    }

    pub async fn webhooks_count(&self, project_id: u64) -> Result<Count, StepError> {
        self.header_count(
            &format!("/api/v4/projects/{project_id}/hooks"),
            "get_webhooks_count",
            50,
        )
        .await
    }

    pub async fn releases_count(&self, project_id: u64) -> Result<Count, StepError> {
        self.header_count(
            &format!("/api/v4/projects/{project_id}/releases"),
            "get_releases_count",
            200,
        )
        .await
    }

    /// Does the project use git submodules?
    pub async fn detect_submodules(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
    ) -> (Detection, Option<StepError>) {
        match self.get_file(project_id, ".gitmodules", git_ref).await {
            Ok(Some(content)) if !content.trim().is_empty() => (Detection::Yes, None),
            Ok(_) => (Detection::No, None),
            Err(e) => {
                let e = StepError::new("detect_submodules", e.message, e.status);
                (Detection::Unknown, Some(e))
            }
        }
    }

    /// CODEOWNERS at any of its conventional locations.
    pub async fn detect_codeowners(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
    ) -> (Detection, Option<StepError>) {
        for path in ["CODEOWNERS", ".gitlab/CODEOWNERS", "docs/CODEOWNERS"] {
            match self.get_file(project_id, path, git_ref).await {
                Ok(Some(content)) if !content.is_empty() => return (Detection::Yes, None),
                Ok(_) => continue,
                Err(e) if e.status == Some(403) => {
                    let e = StepError::new("detect_codeowners", e.message, e.status);
                    return (Detection::Unknown, Some(e));
                }
                Err(_) => continue,
            }
        }
        (Detection::No, None)
    }

    /// `public/` folder at the repository root (Pages hint).
    pub async fn detect_public_folder(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
    ) -> (Detection, Option<StepError>) {
        match self.get_tree(project_id, git_ref).await {
            Ok(entries) => (
                entries
                    .iter()
                    .any(|e| e.name == "public" && e.kind == "tree")
                    .into(),
                None,
            ),
            Err(e) => {
                let e = StepError::new("detect_public_folder", e.message, e.status);
                (Detection::Unknown, Some(e))
            }
        }
    }

    /// Container-related files at the repository root (registry hint).
    pub async fn detect_container_files(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
    ) -> Result<ContainerHints, StepError> {
        let entries = match self.get_tree(project_id, git_ref).await {
            Ok(entries) => entries,
            Err(e) if e.status == Some(403) => {
                return Ok(ContainerHints {
                    has_dockerfile: Detection::Unknown,
                    has_compose: Detection::Unknown,
                    has_k8s: Detection::Unknown,
                })
            }
            Err(e) => return Err(StepError::new("detect_container_files", e.message, e.status)),
        };

        let mut hints = ContainerHints {
            has_dockerfile: Detection::No,
            has_compose: Detection::No,
            has_k8s: Detection::No,
        };
        for entry in entries {
            let name = entry.name.to_ascii_lowercase();
            if name == "dockerfile" {
                hints.has_dockerfile = Detection::Yes;
            } else if name == "docker-compose.yml" || name == "docker-compose.yaml" {
                hints.has_compose = Detection::Yes;
            } else if entry.kind == "tree"
                && matches!(name.as_str(), "helm" | "k8s" | "kubernetes" | "charts")
            {
                hints.has_k8s = Detection::Yes;
            }
        }
        Ok(hints)
    }

    /// First `max_lines` of the CI configuration. `Ok(None)` when absent.
    pub async fn ci_content(
        &self,
        project_id: u64,
        git_ref: Option<&str>,
        max_lines: usize,
    ) -> Result<Option<CiSample>, StepError> {
        let content = match self.get_file(project_id, ".gitlab-ci.yml", git_ref).await {
            Ok(Some(content)) => content,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StepError::new("get_ci_content", e.message, e.status)),
        };
        let all_lines: Vec<&str> = content.lines().collect();
        let truncated = all_lines.len() > max_lines;
        debug!(project_id, lines = all_lines.len(), truncated, "fetched CI sample");
        Ok(Some(CiSample {
            content: all_lines[..all_lines.len().min(max_lines)].join("\n"),
            truncated,
            total_lines: all_lines.len(),
        }))
    }

    /// Project feature flags for enrichment.
    pub async fn project_features(&self, project_id: u64) -> Result<ProjectFeatures, StepError> {
        let body = self.get_project(&project_id.to_string()).await?;
        Ok(ProjectFeatures {
            container_registry_enabled: body["container_registry_enabled"]
                .as_bool()
                .unwrap_or(false),
            packages_enabled: body["packages_enabled"].as_bool().unwrap_or(false),
            wiki_enabled: body["wiki_enabled"].as_bool().unwrap_or(false),
            pages_access_level: body["pages_access_level"]
                .as_str()
                .unwrap_or("disabled")
                .to_string(),
            lfs_enabled: body["lfs_enabled"].as_bool().unwrap_or(false),
        })
    }
}
