//! Regex-based CI configuration profiler
//!
//! A deliberate line scanner rather than a YAML parser: tolerant of
//! malformed documents, and conservative in the false-positive
//! direction since the output is advisory.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Keys at the top level that are configuration, not jobs.
const RESERVED_KEYS: &[&str] = &[
    "default",
    "include",
    "stages",
    "variables",
    "workflow",
    "before_script",
    "after_script",
    "image",
    "services",
    "cache",
    "pages",
    ".pre",
    ".post",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiFeatures {
    pub include: bool,
    pub services: bool,
    pub artifacts: bool,
    pub cache: bool,
    pub rules: bool,
    pub needs: bool,
    pub parallel: bool,
    pub trigger: bool,
    pub environments: bool,
    pub manual_jobs: bool,
    pub variables: bool,
    pub extends: bool,
    pub matrix: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerHints {
    pub uses_tags: bool,
    pub possible_self_hosted: bool,
    pub docker_in_docker: bool,
    pub privileged: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CiProfile {
    pub present: bool,
    pub features: CiFeatures,
    pub runner_hints: RunnerHints,
    pub job_count: usize,
    pub stage_count: usize,
    pub include_count: usize,
}

fn include_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*-\s*((local|remote|project|template|file)\s*:|['"]?/)"#)
            .expect("valid regex")
    })
}

fn stage_item() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-\s*(\w+)").expect("valid regex"))
}

/// Extract a CI profile from raw configuration text.
pub fn parse_ci_content(content: &str) -> CiProfile {
    let mut profile = CiProfile {
        present: true,
        ..Default::default()
    };

    if content.trim().is_empty() {
        profile.present = false;
        return profile;
    }

    let mut jobs: BTreeSet<String> = BTreeSet::new();
    let mut stages: BTreeSet<String> = BTreeSet::new();
    let mut in_stages_block = false;

    for line in content.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_top_level = !line.starts_with(' ') && !line.starts_with('\t');

        // Top-level key handling: job identification + stages block tracking.
        if is_top_level {
            if let Some((key, _)) = line.split_once(':') {
                let key = key.trim();
                in_stages_block = key == "stages";
                if !key.is_empty()
                    && !key.starts_with('.')
                    && !RESERVED_KEYS.contains(&key)
                {
                    jobs.insert(key.to_string());
                }
            } else {
                in_stages_block = false;
            }
        } else if in_stages_block {
            if let Some(captures) = stage_item().captures(stripped) {
                stages.insert(captures[1].to_string());
            } else {
                in_stages_block = false;
            }
        }

        let lower = stripped.to_ascii_lowercase();

        if stripped.starts_with("include:") || stripped.starts_with("include :") {
            profile.features.include = true;
        }
        if include_item().is_match(line) {
            profile.include_count += 1;
        }
        if stripped.contains("services:") {
            profile.features.services = true;
        }
        if lower.contains("dind") {
            profile.runner_hints.docker_in_docker = true;
            profile.runner_hints.possible_self_hosted = true;
        }
        if lower.contains("privileged") && lower.contains("true") {
            profile.runner_hints.privileged = true;
            profile.runner_hints.possible_self_hosted = true;
        }
        if stripped.contains("artifacts:") {
            profile.features.artifacts = true;
        }
        if stripped.starts_with("cache:") {
            profile.features.cache = true;
        }
        if stripped.starts_with("rules:") {
            profile.features.rules = true;
        }
        if stripped.starts_with("only:") || stripped.starts_with("except:") {
            profile.features.rules = true;
        }
        if stripped.starts_with("needs:") {
            profile.features.needs = true;
        }
        if stripped.starts_with("parallel:") {
            profile.features.parallel = true;
        }
        if stripped.contains("matrix:") {
            profile.features.matrix = true;
            profile.features.parallel = true;
        }
        if stripped.starts_with("trigger:") {
            profile.features.trigger = true;
        }
        if stripped.starts_with("environment:") {
            profile.features.environments = true;
        }
        if lower.starts_with("when:") && lower.contains("manual") {
            profile.features.manual_jobs = true;
        }
        if stripped.starts_with("variables:") {
            profile.features.variables = true;
        }
        if stripped.starts_with("extends:") {
            profile.features.extends = true;
        }
        if stripped.starts_with("tags:") {
            profile.runner_hints.uses_tags = true;
            profile.runner_hints.possible_self_hosted = true;
        }
    }

    profile.job_count = jobs.len();
    profile.stage_count = if stages.is_empty() {
        usize::from(!jobs.is_empty())
    } else {
        stages.len()
    };
    if profile.features.include && profile.include_count == 0 {
        profile.include_count = 1;
    }

    profile
}

/// CI complexity contribution: a score in [0, 50] plus the factors
/// behind it.
pub fn ci_complexity_score(profile: &CiProfile) -> (u32, Vec<String>) {
    if !profile.present {
        return (0, Vec::new());
    }

    let mut score: u32 = 5;
    let mut factors = vec!["Has CI configuration".to_string()];

    let features = &profile.features;
    let hints = &profile.runner_hints;

    if features.include {
        score += 8;
        factors.push(format!("Uses includes ({} includes)", profile.include_count));
    }
    if features.services {
        score += 5;
        factors.push("Uses services".to_string());
    }
    if features.artifacts {
        score += 3;
        factors.push("Uses artifacts".to_string());
    }
    if features.cache {
        score += 2;
        factors.push("Uses cache".to_string());
    }
    if features.rules {
        score += 5;
        factors.push("Uses rules/only/except".to_string());
    }
    if features.needs {
        score += 7;
        factors.push("Uses DAG (needs)".to_string());
    }
    if features.parallel {
        score += 5;
        factors.push("Uses parallel/matrix".to_string());
    }
    if features.trigger {
        score += 10;
        factors.push("Uses multi-project triggers".to_string());
    }
    if features.environments {
        score += 5;
        factors.push("Uses environments".to_string());
    }
    if features.manual_jobs {
        score += 3;
        factors.push("Has manual jobs".to_string());
    }
    if features.extends {
        score += 4;
        factors.push("Uses extends (templates)".to_string());
    }
    if hints.uses_tags {
        score += 8;
        factors.push("Uses custom runner tags".to_string());
    }
    if hints.docker_in_docker {
        score += 10;
        factors.push("Uses Docker-in-Docker".to_string());
    }
    if hints.privileged {
        score += 8;
        factors.push("Requires privileged mode".to_string());
    }

    if profile.job_count > 20 {
        score += 10;
        factors.push(format!("Large pipeline ({} jobs)", profile.job_count));
    } else if profile.job_count > 10 {
        score += 5;
        factors.push(format!("Medium pipeline ({} jobs)", profile.job_count));
    } else if profile.job_count > 5 {
        score += 2;
        factors.push(format!("Small pipeline ({} jobs)", profile.job_count));
    }

    (score.min(50), factors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_is_not_present() {
        let profile = parse_ci_content("");
        assert!(!profile.present);
        assert_eq!(ci_complexity_score(&profile).0, 0);
    }

    #[test]
    fn simple_pipeline_counts_jobs_and_stages() {
        let ci = "stages:\n  - build\n  - test\n\nbuild-job:\n  stage: build\n  script:\n    - make\n\ntest-job:\n  stage: test\n  script:\n    - make test\n";
        let profile = parse_ci_content(ci);
        assert!(profile.present);
        assert_eq!(profile.job_count, 2);
        assert_eq!(profile.stage_count, 2);
        assert!(!profile.features.include);
    }

    #[test]
    fn reserved_keys_and_hidden_jobs_are_not_jobs() {
        let ci = "variables:\n  FOO: bar\n.template:\n  script: [echo]\ndeploy:\n  script: [echo]\n";
        let profile = parse_ci_content(ci);
        assert_eq!(profile.job_count, 1);
        assert!(profile.features.variables);
    }

    #[test]
    fn detects_includes_and_counts_them() {
        let ci = "include:\n  - local: /templates/a.yml\n  - local: /templates/b.yml\n\njob:\n  script: [echo]\n";
        let profile = parse_ci_content(ci);
        assert!(profile.features.include);
        assert_eq!(profile.include_count, 2);
    }

    #[test]
    fn detects_runner_hints() {
        let ci = "job:\n  services:\n    - docker:dind\n  tags:\n    - self-hosted\n  script: [echo]\n";
        let profile = parse_ci_content(ci);
        assert!(profile.features.services);
        assert!(profile.runner_hints.docker_in_docker);
        assert!(profile.runner_hints.uses_tags);
        assert!(profile.runner_hints.possible_self_hosted);
    }

    #[test]
    fn detects_manual_jobs_rules_and_needs() {
        let ci = "job:\n  rules:\n    - if: $VAR\n  needs: [other]\n  when: manual\n  script: [echo]\n";
        let profile = parse_ci_content(ci);
        assert!(profile.features.rules);
        assert!(profile.features.needs);
        assert!(profile.features.manual_jobs);
    }

    #[test]
    fn matrix_implies_parallel() {
        let ci = "job:\n  parallel:\n    matrix:\n      - VER: [1, 2]\n  script: [echo]\n";
        let profile = parse_ci_content(ci);
        assert!(profile.features.matrix);
        assert!(profile.features.parallel);
    }

    #[test]
    fn score_is_capped_at_fifty() {
        let ci = "include:\n  - local: /a.yml\nstages:\n  - a\njob1:\n  services: [docker:dind]\n  tags: [custom]\n  rules:\n    - if: $X\n  needs: [job2]\n  parallel: 3\n  trigger: other/project\n  environment: prod\n  when: manual\n  extends: .base\n  artifacts:\n    paths: [out]\n  cache:\n    paths: [deps]\n  script: [echo]\n";
        let (score, factors) = ci_complexity_score(&parse_ci_content(ci));
        assert_eq!(score, 50);
        assert!(factors.len() > 5);
    }

    #[test]
    fn ci_heavy_profile_scores_at_least_thirty() {
        // include + services + dind + custom tags + 15 jobs
        let mut ci = String::from("include:\n  - local: /base.yml\n");
        for i in 0..15 {
            ci.push_str(&format!(
                "job{i}:\n  services:\n    - docker:dind\n  tags:\n    - self-hosted\n  script: [echo]\n"
            ));
        }
        let profile = parse_ci_content(&ci);
        assert_eq!(profile.job_count, 15);
        assert!(profile.features.include);
        assert!(profile.runner_hints.docker_in_docker);
        assert!(profile.runner_hints.possible_self_hosted);
        let (score, _) = ci_complexity_score(&profile);
        assert!(score >= 30, "score {score} should be >= 30");
    }
}
