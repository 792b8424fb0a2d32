//! Source CI configuration to destination workflow conversion

use crate::result::TransformOutcome;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use tracing::info;

/// Top-level keys that are configuration rather than jobs.
const RESERVED_KEYS: &[&str] = &[
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

fn job_name_invalid() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("valid regex"))
}

fn hyphen_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-+").expect("valid regex"))
}

/// Convert a source CI document (YAML text or already-parsed tree) to
/// a destination workflow. The outcome data carries both the workflow
/// tree and its YAML rendering; unmapped constructs are appended to
/// `metadata.conversion_gaps` with a suggested action.
pub fn transform_ci(input: &Value) -> TransformOutcome {
    let mut outcome = TransformOutcome::new();

    let doc = match input {
        Value::String(text) => match serde_yaml::from_str::<serde_yaml::Value>(text) {
            Ok(yaml) => match serde_json::to_value(&yaml) {
                Ok(doc) => doc,
                Err(e) => {
                    outcome.add_error(format!("Invalid CI document: {e}"), Value::Null);
                    return outcome;
                }
            },
            Err(e) => {
                outcome.add_error(format!("Invalid YAML: {e}"), Value::Null);
                return outcome;
            }
        },
        other => other.clone(),
    };

    if !doc.is_object() {
        outcome.add_error("CI document is not a mapping", Value::Null);
        return outcome;
    }

    let mut converter = CiConverter::default();
    let stages: Vec<String> = doc["stages"]
        .as_array()
        .map(|stages| {
            stages
                .iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    let jobs = extract_jobs(&doc);
    let variables = doc["variables"].as_object().cloned().unwrap_or_default();

    let workflow = converter.build_workflow(&stages, &jobs, &variables);
    let workflow_yaml = serde_yaml::to_string(&workflow).unwrap_or_default();

    info!(jobs = jobs.len(), gaps = converter.gaps.len(), "converted CI document");

    outcome.set_meta("conversion_gaps", Value::Array(converter.gaps));
    outcome.set_meta("jobs_converted", json!(jobs.len()));
    outcome.set_meta("stages", json!(stages.len()));
    outcome.data = Some(json!({
        "workflow": workflow,
        "workflow_yaml": workflow_yaml,
    }));
    outcome
}

/// Job entries: top-level mappings with a script or trigger, skipping
/// hidden (`.`-prefixed) entries and reserved keys.
fn extract_jobs(doc: &Value) -> Map<String, Value> {
    let mut jobs = Map::new();
    let Some(entries) = doc.as_object() else {
        return jobs;
    };
    for (key, value) in entries {
        if key.starts_with('.') || RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if value.is_object() && (!value["script"].is_null() || !value["trigger"].is_null()) {
            jobs.insert(key.clone(), value.clone());
        }
    }
    jobs
}

#[derive(Default)]
struct CiConverter {
    gaps: Vec<Value>,
}

impl CiConverter {
    fn add_gap(&mut self, kind: &str, message: String, action: &str) {
        self.gaps.push(json!({
            "type": kind,
            "message": message,
            "action": action,
        }));
    }

    fn build_workflow(
        &mut self,
        stages: &[String],
        jobs: &Map<String, Value>,
        variables: &Map<String, Value>,
    ) -> Value {
        let mut workflow_jobs = Map::new();
        for (name, config) in jobs {
            workflow_jobs.insert(sanitize_job_name(name), self.convert_job(config, stages));
        }

        json!({
            "name": "CI",
            "on": self.convert_triggers(jobs),
            "env": self.convert_variables(variables),
            "jobs": workflow_jobs,
        })
    }

    fn convert_job(&mut self, config: &Value, stages: &[String]) -> Value {
        let tags: Vec<String> = config["tags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut job = Map::new();
        job.insert("runs-on".to_string(), json!(self.convert_tags(&tags)));

        let needs = self.convert_needs(config, stages);
        if !needs.is_empty() {
            job.insert("needs".to_string(), json!(needs));
        }
        if !config["image"].is_null() {
            job.insert("container".to_string(), convert_image(&config["image"]));
        }
        if let Some(services) = config["services"].as_array() {
            job.insert("services".to_string(), convert_services(services));
        }
        if let Some(variables) = config["variables"].as_object() {
            job.insert("env".to_string(), self.convert_variables(variables));
        }
        if let Some(condition) = convert_rules(config) {
            job.insert("if".to_string(), json!(condition));
        }
        job.insert("steps".to_string(), self.convert_steps(config));

        Value::Object(job)
    }

    fn convert_steps(&mut self, config: &Value) -> Value {
        let mut steps: Vec<Value> = vec![json!({
            "name": "Checkout code",
            "uses": "actions/checkout@v4",
        })];

        if !config["before_script"].is_null() {
            steps.push(json!({
                "name": "Before script",
                "run": self.convert_script(&config["before_script"]),
            }));
        }
        if !config["script"].is_null() {
            steps.push(json!({
                "name": "Run script",
                "run": self.convert_script(&config["script"]),
            }));
        }
        if !config["after_script"].is_null() {
            steps.push(json!({
                "name": "After script",
                "if": "always()",
                "run": self.convert_script(&config["after_script"]),
            }));
        }
        if let Some(artifact_step) = convert_artifacts(&config["artifacts"]) {
            steps.push(artifact_step);
        }
        if let Some(cache_step) = convert_cache(&config["cache"]) {
            // Cache restores early, right after checkout.
            steps.insert(1, cache_step);
        }

        Value::Array(steps)
    }

    fn convert_script(&mut self, script: &Value) -> String {
        let text = match script {
            Value::Array(lines) => lines
                .iter()
                .map(|line| match line {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.rewrite_registry_urls(&text)
    }

    /// Rewrite source-registry references to the destination registry.
    fn rewrite_registry_urls(&mut self, script: &str) -> String {
        let rewrites = [
            ("registry.gitlab.com", "ghcr.io", true),
            ("$CI_REGISTRY_IMAGE", "ghcr.io/${{ github.repository }}", true),
            ("${CI_REGISTRY_IMAGE}", "ghcr.io/${{ github.repository }}", true),
            ("$CI_REGISTRY", "ghcr.io", false),
            ("${CI_REGISTRY}", "ghcr.io", false),
        ];

        let mut rewritten = script.to_string();
        for (from, to, report) in rewrites {
            if rewritten.contains(from) {
                rewritten = rewritten.replace(from, to);
                if report {
                    self.add_gap(
                        "registry_url",
                        format!("Transformed registry reference: {from} -> {to}"),
                        "Verify registry URLs are correct for your setup",
                    );
                }
            }
        }
        rewritten
    }

    /// Workflow triggers inferred from `only`/`except`/`rules`; with no
    /// signal, default to push + pull_request on main/master.
    fn convert_triggers(&mut self, jobs: &Map<String, Value>) -> Value {
        let mut has_push = false;
        let mut has_mr = false;
        let mut has_schedule = false;

        for config in jobs.values() {
            if let Some(only) = config["only"].as_array() {
                for entry in only.iter().filter_map(|v| v.as_str()) {
                    match entry {
                        "pushes" | "branches" => has_push = true,
                        "merge_requests" => has_mr = true,
                        "schedules" => has_schedule = true,
                        _ => {}
                    }
                }
            }
            if let Some(rules) = config["rules"].as_array() {
                for rule in rules {
                    let condition = rule["if"].as_str().unwrap_or_default();
                    if condition.contains("$CI_PIPELINE_SOURCE") {
                        if condition.contains("merge_request") {
                            has_mr = true;
                        }
                        if condition.contains("schedule") {
                            has_schedule = true;
                        }
                        if condition.contains("push") {
                            has_push = true;
                        }
                    }
                }
            }
        }

        let default_branches = json!({"branches": ["main", "master"]});
        let mut triggers = Map::new();
        if !has_push && !has_mr && !has_schedule {
            triggers.insert("push".to_string(), default_branches.clone());
            triggers.insert("pull_request".to_string(), default_branches);
        } else {
            if has_push {
                triggers.insert("push".to_string(), default_branches.clone());
            }
            if has_mr {
                triggers.insert("pull_request".to_string(), default_branches);
            }
            if has_schedule {
                triggers.insert("schedule".to_string(), json!([{"cron": "0 0 * * *"}]));
                self.add_gap(
                    "schedule",
                    "Schedule trigger detected but no cron expression found. Default daily schedule created.".to_string(),
                    "Review and update schedule cron expression in workflow file",
                );
            }
        }
        Value::Object(triggers)
    }

    /// Variables: plain values pass through; CI_* names map to
    /// destination expressions or become gaps.
    fn convert_variables(&mut self, variables: &Map<String, Value>) -> Value {
        let mut env = Map::new();
        for (key, value) in variables {
            if key.starts_with("CI_") {
                match map_ci_variable(key) {
                    Some(mapped) => {
                        env.insert(key.clone(), json!(mapped));
                    }
                    None => self.add_gap(
                        "variable",
                        format!("CI variable {key} has no direct destination equivalent"),
                        "Review and manually set this variable or secret",
                    ),
                }
            } else {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                env.insert(key.clone(), json!(text));
            }
        }
        Value::Object(env)
    }

    fn convert_needs(&mut self, config: &Value, stages: &[String]) -> Vec<String> {
        if let Some(needs) = config["needs"].as_array() {
            return needs
                .iter()
                .filter_map(|need| match need {
                    Value::String(name) => Some(sanitize_job_name(name)),
                    Value::Object(map) => map
                        .get("job")
                        .and_then(|j| j.as_str())
                        .map(sanitize_job_name),
                    _ => None,
                })
                .collect();
        }

        // Stage ordering implies dependencies the workflow model cannot
        // express without the full job-to-stage table.
        if let Some(stage) = config["stage"].as_str() {
            if stages.iter().position(|s| s == stage).unwrap_or(0) > 0 {
                self.add_gap(
                    "stage_dependency",
                    format!("Stage-based dependency for '{stage}' may need manual adjustment"),
                    "Review job dependencies in workflow file",
                );
            }
        }
        Vec::new()
    }

    /// Runner tags map to hosted labels where possible; custom tags
    /// fall back to the default runner and raise a gap.
    fn convert_tags(&mut self, tags: &[String]) -> String {
        if tags.is_empty() {
            return "ubuntu-latest".to_string();
        }
        for tag in tags {
            let mapped = match tag.to_ascii_lowercase().as_str() {
                "docker" | "linux" | "ubuntu" => Some("ubuntu-latest"),
                "windows" => Some("windows-latest"),
                "macos" | "mac" => Some("macos-latest"),
                _ => None,
            };
            if let Some(label) = mapped {
                return label.to_string();
            }
        }
        self.add_gap(
            "runner_tags",
            format!("Custom runner tags {tags:?} may require self-hosted runner setup"),
            "Configure self-hosted runners or update runs-on value",
        );
        "ubuntu-latest".to_string()
    }
}

fn map_ci_variable(name: &str) -> Option<&'static str> {
    match name {
        "CI_COMMIT_SHA" => Some("${{ github.sha }}"),
        "CI_COMMIT_REF_NAME" | "CI_COMMIT_BRANCH" | "CI_COMMIT_TAG" => {
            Some("${{ github.ref_name }}")
        }
        "CI_PROJECT_NAME" => Some("${{ github.event.repository.name }}"),
        "CI_PROJECT_PATH" => Some("${{ github.repository }}"),
        "CI_PIPELINE_ID" => Some("${{ github.run_id }}"),
        "CI_PIPELINE_IID" => Some("${{ github.run_number }}"),
        "CI_JOB_ID" => Some("${{ github.job }}"),
        "CI_REPOSITORY_URL" => Some("${{ github.repositoryUrl }}"),
        "CI_DEFAULT_BRANCH" => Some("${{ github.event.repository.default_branch }}"),
        "CI_REGISTRY" => Some("ghcr.io"),
        "CI_REGISTRY_IMAGE" => Some("ghcr.io/${{ github.repository }}"),
        _ => None,
    }
}

fn convert_image(image: &Value) -> Value {
    match image {
        Value::String(name) => json!({"image": name}),
        Value::Object(map) => {
            let mut container = Map::new();
            container.insert(
                "image".to_string(),
                map.get("name").cloned().unwrap_or(json!("")),
            );
            if let Some(entrypoint) = map.get("entrypoint") {
                container.insert(
                    "options".to_string(),
                    json!(format!("--entrypoint {entrypoint}")),
                );
            }
            Value::Object(container)
        }
        _ => json!({"image": "ubuntu:latest"}),
    }
}

fn convert_services(services: &[Value]) -> Value {
    let mut converted = Map::new();
    for (index, service) in services.iter().enumerate() {
        match service {
            Value::String(name) => {
                let key = name.split(':').next().unwrap_or(name).replace('/', "-");
                converted.insert(key, json!({"image": name}));
            }
            Value::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(|n| n.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| format!("service-{index}"));
                let key = name.split(':').next().unwrap_or(&name).replace('/', "-");
                let mut entry = Map::new();
                entry.insert("image".to_string(), json!(name));
                if let Some(alias) = map.get("alias").and_then(|a| a.as_str()) {
                    entry.insert("options".to_string(), json!(format!("--network-alias {alias}")));
                }
                converted.insert(key, Value::Object(entry));
            }
            _ => {}
        }
    }
    Value::Object(converted)
}

fn paths_to_string(paths: &Value) -> Option<String> {
    match paths {
        Value::Array(entries) => {
            let lines: Vec<String> = entries
                .iter()
                .filter_map(|p| p.as_str().map(String::from))
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        Value::String(path) => Some(path.clone()),
        _ => None,
    }
}

fn convert_artifacts(artifacts: &Value) -> Option<Value> {
    let paths = paths_to_string(&artifacts["paths"])?;
    Some(json!({
        "name": "Upload artifacts",
        "uses": "actions/upload-artifact@v4",
        "with": {
            "name": artifacts["name"].as_str().unwrap_or("artifacts"),
            "path": paths,
        },
    }))
}

fn convert_cache(cache: &Value) -> Option<Value> {
    let paths = paths_to_string(&cache["paths"])?;
    let key = match &cache["key"] {
        Value::String(key) => key.clone(),
        _ => "${{ runner.os }}-cache".to_string(),
    };
    Some(json!({
        "name": "Cache dependencies",
        "uses": "actions/cache@v4",
        "with": { "path": paths, "key": key },
    }))
}

fn convert_rules(config: &Value) -> Option<String> {
    let mut conditions: Vec<String> = Vec::new();

    if let Some(refs) = config["only"]["refs"].as_array() {
        for entry in refs.iter().filter_map(|v| v.as_str()) {
            match entry {
                "merge_requests" => conditions.push("github.event_name == 'pull_request'".into()),
                "branches" => conditions.push("github.ref_type == 'branch'".into()),
                "tags" => conditions.push("github.ref_type == 'tag'".into()),
                _ => {}
            }
        }
    }
    if let Some(refs) = config["except"]["refs"].as_array() {
        for entry in refs.iter().filter_map(|v| v.as_str()) {
            match entry {
                "merge_requests" => conditions.push("github.event_name != 'pull_request'".into()),
                "branches" => conditions.push("github.ref_type != 'branch'".into()),
                _ => {}
            }
        }
    }
    if let Some(rules) = config["rules"].as_array() {
        for rule in rules {
            if let Some(condition) = rule["if"].as_str() {
                conditions.push(convert_if_condition(condition));
            }
        }
    }

    if conditions.is_empty() {
        None
    } else {
        Some(conditions.join(" && "))
    }
}

fn convert_if_condition(source_if: &str) -> String {
    let replacements = [
        ("$CI_COMMIT_BRANCH", "github.ref_name"),
        ("$CI_COMMIT_TAG", "github.ref_name"),
        ("$CI_MERGE_REQUEST_ID", "github.event.pull_request.number"),
        ("$CI_PIPELINE_SOURCE", "github.event_name"),
        ("== 'merge_request_event'", "== 'pull_request'"),
    ];
    let mut converted = source_if.to_string();
    for (from, to) in replacements {
        converted = converted.replace(from, to);
    }
    converted
}

fn sanitize_job_name(name: &str) -> String {
    let replaced = job_name_invalid().replace_all(name, "-");
    let collapsed = hyphen_runs().replace_all(&replaced, "-");
    collapsed.trim_matches('-').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ci(text: &str) -> Value {
        Value::String(text.to_string())
    }

    #[test]
    fn default_triggers_when_no_rules_present() {
        let outcome = transform_ci(&ci("build:\n  script:\n    - make\n"));
        assert!(outcome.success);
        let workflow = &outcome.data.as_ref().unwrap()["workflow"];
        assert_eq!(workflow["on"]["push"]["branches"], json!(["main", "master"]));
        assert_eq!(
            workflow["on"]["pull_request"]["branches"],
            json!(["main", "master"])
        );
        let gaps = outcome.metadata["conversion_gaps"].as_array().unwrap();
        assert!(gaps.is_empty(), "expected no gaps, got {gaps:?}");
    }

    #[test]
    fn scripts_become_run_steps_with_checkout_first() {
        let outcome = transform_ci(&ci(
            "test:\n  before_script:\n    - setup\n  script:\n    - cargo test\n  after_script:\n    - cleanup\n",
        ));
        let steps = outcome.data.as_ref().unwrap()["workflow"]["jobs"]["test"]["steps"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(steps[0]["uses"], "actions/checkout@v4");
        assert_eq!(steps[1]["run"], "setup");
        assert_eq!(steps[2]["run"], "cargo test");
        assert_eq!(steps[3]["if"], "always()");
    }

    #[test]
    fn registry_references_are_rewritten_with_a_gap() {
        let outcome = transform_ci(&ci(
            "push:\n  script:\n    - docker push $CI_REGISTRY_IMAGE:latest\n",
        ));
        let run = outcome.data.as_ref().unwrap()["workflow"]["jobs"]["push"]["steps"][1]["run"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(run.contains("ghcr.io/${{ github.repository }}"));
        let gaps = outcome.metadata["conversion_gaps"].as_array().unwrap();
        assert!(gaps.iter().any(|g| g["type"] == "registry_url"));
    }

    #[test]
    fn custom_runner_tags_raise_a_gap() {
        let outcome = transform_ci(&ci(
            "deploy:\n  tags:\n    - self-hosted-gpu\n  script:\n    - ./deploy.sh\n",
        ));
        let workflow = &outcome.data.as_ref().unwrap()["workflow"];
        assert_eq!(workflow["jobs"]["deploy"]["runs-on"], "ubuntu-latest");
        let gaps = outcome.metadata["conversion_gaps"].as_array().unwrap();
        assert!(gaps.iter().any(|g| g["type"] == "runner_tags"));
    }

    #[test]
    fn hidden_and_reserved_keys_are_not_jobs() {
        let outcome = transform_ci(&ci(
            "stages:\n  - build\n.template:\n  script: [echo]\nvariables:\n  FOO: bar\nbuild:\n  script: [make]\n",
        ));
        let jobs = outcome.data.as_ref().unwrap()["workflow"]["jobs"]
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(jobs.len(), 1);
        assert!(jobs.contains_key("build"));
        assert_eq!(outcome.metadata["jobs_converted"], 1);
    }

    #[test]
    fn artifacts_and_cache_become_action_steps() {
        let outcome = transform_ci(&ci(
            "build:\n  script: [make]\n  artifacts:\n    paths:\n      - target/\n  cache:\n    key: deps\n    paths:\n      - .cargo/\n",
        ));
        let steps = outcome.data.as_ref().unwrap()["workflow"]["jobs"]["build"]["steps"]
            .as_array()
            .unwrap()
            .clone();
        // checkout, cache, script, upload
        assert_eq!(steps[1]["uses"], "actions/cache@v4");
        assert_eq!(steps[1]["with"]["key"], "deps");
        assert_eq!(steps.last().unwrap()["uses"], "actions/upload-artifact@v4");
    }

    #[test]
    fn mr_only_jobs_trigger_pull_request() {
        let outcome = transform_ci(&ci(
            "review:\n  script: [check]\n  only:\n    - merge_requests\n",
        ));
        let on = &outcome.data.as_ref().unwrap()["workflow"]["on"];
        assert!(on["pull_request"].is_object());
        assert!(on["push"].is_null());
    }

    #[test]
    fn variable_mapping_and_gaps() {
        let outcome = transform_ci(&ci(
            "variables:\n  APP_ENV: prod\n  CI_COMMIT_SHA: ignored\n  CI_RUNNER_ID: custom\nbuild:\n  script: [make]\n",
        ));
        let env = &outcome.data.as_ref().unwrap()["workflow"]["env"];
        assert_eq!(env["APP_ENV"], "prod");
        assert_eq!(env["CI_COMMIT_SHA"], "${{ github.sha }}");
        assert!(env["CI_RUNNER_ID"].is_null());
        let gaps = outcome.metadata["conversion_gaps"].as_array().unwrap();
        assert!(gaps
            .iter()
            .any(|g| g["type"] == "variable" && g["message"].as_str().unwrap().contains("CI_RUNNER_ID")));
    }

    #[test]
    fn invalid_yaml_is_an_error_not_a_panic() {
        let outcome = transform_ci(&ci("job: [unclosed"));
        assert!(!outcome.success);
        assert!(!outcome.errors.is_empty());
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let text = ci("build:\n  script: [make]\n");
        let a = transform_ci(&text);
        let b = transform_ci(&text);
        assert_eq!(a.data, b.data);
        assert_eq!(a.metadata["conversion_gaps"], b.metadata["conversion_gaps"]);
    }
}
