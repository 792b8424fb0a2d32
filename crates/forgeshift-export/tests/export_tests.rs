//! End-to-end export against a mocked source forge

use forgeshift_client::{ClientOptions, GitLabClient};
use forgeshift_export::{ComponentKind, ExportOptions, ExportOrchestrator, ExportStatus};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CI_FILE_B64: &str = "c3RhZ2VzOgogIC0gYnVpbGQKCmJ1aWxkOgogIHNjcmlwdDoKICAgIC0gbWFrZQo=";

async fn mount_project(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/55"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 55,
            "path_with_namespace": "acme/tiny",
            "name": "tiny",
            "path": "tiny",
            "default_branch": "main",
            "archived": false,
            "visibility": "private",
            "empty_repo": false,
            "wiki_enabled": false,
            "http_url_to_repo": "https://gitlab.example.com/acme/tiny.git",
            "ssh_url_to_repo": "git@gitlab.example.com:acme/tiny.git"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v4/projects/55/repository/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "name": "main",
            "protected": true,
            "merged": false,
            "default": true,
            "commit": {"id": "abc123", "message": "init"}
        }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/55/repository/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;

    // CI configuration exists; .gitattributes and .gitmodules do not.
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/55/repository/files/.gitlab-ci.yml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"content": CI_FILE_B64})),
        )
        .mount(server)
        .await;
    for file in [".gitattributes", ".gitmodules"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v4/projects/55/repository/files/{file}")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "404"})))
            .mount(server)
            .await;
    }

    for endpoint in [
        "variables",
        "environments",
        "pipeline_schedules",
        "pipelines",
        "labels",
        "milestones",
        "issues",
        "merge_requests",
        "releases",
        "packages",
        "protected_branches",
        "protected_tags",
        "members/all",
        "hooks",
        "deploy_keys",
        "deploy_tokens",
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v4/projects/55/{endpoint}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }
}

fn orchestrator(server: &MockServer, output: &std::path::Path, run_id: &str) -> ExportOrchestrator {
    let client = Arc::new(
        GitLabClient::new(&server.uri(), "test-token", ClientOptions::default()).unwrap(),
    );
    ExportOrchestrator::new(
        client,
        ExportOptions {
            output_dir: output.to_path_buf(),
            run_id: Some(run_id.to_string()),
        },
    )
}

#[tokio::test]
async fn full_export_writes_the_artifact_tree_and_checkpoint() {
    let server = MockServer::start().await;
    mount_project(&server).await;
    let output = tempfile::tempdir().unwrap();

    let result = orchestrator(&server, output.path(), "run-1")
        .export_project("55")
        .await
        .unwrap();

    assert_eq!(result.status, ExportStatus::Completed);
    assert_eq!(result.project_id, 55);
    assert_eq!(result.components.len(), 8);

    let run_dir = output.path().join("55").join("run-1");
    assert!(run_dir.join("checkpoint.json").exists());
    assert!(run_dir.join("repository").join("branches.json").exists());
    assert!(run_dir.join("cicd").join(".gitlab-ci.yml").exists());
    assert!(run_dir.join("issues").join("issues.json").exists());
    assert!(run_dir
        .join("merge_requests")
        .join("merge_requests.json")
        .exists());
    assert!(run_dir.join("settings").join("webhooks.json").exists());
    assert!(run_dir.join("export_result.json").exists());

    // The decoded CI file round-trips.
    let ci = std::fs::read_to_string(run_dir.join("cicd").join(".gitlab-ci.yml")).unwrap();
    assert!(ci.contains("stages:"));

    // Wiki was disabled on the project.
    let wiki = &result.components[&ComponentKind::Wiki];
    assert_eq!(wiki.status, ExportStatus::Skipped);

    // Checkpoint lists every completed component.
    let checkpoint: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("checkpoint.json")).unwrap())
            .unwrap();
    let completed = checkpoint["completed_components"].as_array().unwrap();
    assert_eq!(completed.len(), 8);
}

#[tokio::test]
async fn resuming_the_same_run_skips_completed_components() {
    let server = MockServer::start().await;
    mount_project(&server).await;
    let output = tempfile::tempdir().unwrap();

    orchestrator(&server, output.path(), "run-1")
        .export_project("55")
        .await
        .unwrap();

    let resumed = orchestrator(&server, output.path(), "run-1")
        .export_project("55")
        .await
        .unwrap();

    assert_eq!(resumed.status, ExportStatus::Completed);
    for (kind, report) in &resumed.components {
        assert_eq!(
            report.status,
            ExportStatus::Skipped,
            "component {kind} should be skipped on resume"
        );
        assert_eq!(report.summary["reason"], "completed_in_previous_run");
    }
}

#[tokio::test]
async fn missing_project_fails_before_any_component_runs() {
    let server = MockServer::start().await;
    mount_project(&server).await;
    let output = tempfile::tempdir().unwrap();

    let err = orchestrator(&server, output.path(), "run-x")
        .export_project("404404")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(!output.path().join("404404").exists());
}

#[tokio::test]
async fn forbidden_substep_is_recorded_without_failing_the_component() {
    let server = MockServer::start().await;

    // Same project, but the CI file probe is forbidden.
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/55/repository/files/.gitlab-ci.yml"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "forbidden"})))
        .mount(&server)
        .await;
    mount_project(&server).await;
    let output = tempfile::tempdir().unwrap();

    let result = orchestrator(&server, output.path(), "run-1")
        .export_project("55")
        .await
        .unwrap();

    let cicd = &result.components[&ComponentKind::CiCd];
    assert_eq!(cicd.status, ExportStatus::Completed);
    assert!(cicd.summary["ci_config_error"].is_string());
    // The variables listing still ran.
    assert!(cicd.summary["variables"]["total"].is_u64());
}
