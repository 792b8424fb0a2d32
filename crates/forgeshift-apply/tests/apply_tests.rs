//! Apply behavior against a mocked destination forge

use forgeshift_apply::{
    execute_with_retry, ActionPlan, ApplyContext, ApplyOptions, ApplyOrchestrator, Credentials,
    RetryOptions, SimulationOutcome,
};
use forgeshift_client::GitHubClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::with_base_url("test-token", &server.uri()).unwrap()
}

fn fast_options(dry_run: bool) -> ApplyOptions {
    ApplyOptions {
        dry_run,
        retry: RetryOptions {
            max_retries: 1,
            ..RetryOptions::default()
        },
        ..ApplyOptions::default()
    }
}

#[tokio::test]
async fn dry_run_existing_label_predicts_skip_without_side_effects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/org/repo/labels/bug"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "bug"})))
        .expect(1)
        .mount(&server)
        .await;
    // No POST mock mounted: a write would fail loudly.

    let plan = ActionPlan::from_json(
        r#"[{"id": "a1", "type": "label_create",
             "parameters": {"target_repo": "org/repo", "name": "bug"}}]"#,
    )
    .unwrap();

    let orchestrator = ApplyOrchestrator::new(client(&server));
    let mut ctx = ApplyContext::new(Credentials::default());
    let report = orchestrator
        .run(&plan, &mut ctx, &fast_options(true))
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.dry_run);
    let result = &report.results[0];
    assert!(result.simulated);
    assert_eq!(result.simulation_outcome, Some(SimulationOutcome::WouldSkip));
}

#[tokio::test]
async fn issue_create_records_mapping_and_comment_uses_it() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/issues"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 7,
            "html_url": "https://destination.example.com/org/repo/issues/7"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/issues/7/comments"))
        .and(body_partial_json(json!({})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9001})))
        .expect(1)
        .mount(&server)
        .await;

    let plan = ActionPlan::from_json(
        r#"[
            {"id": "a1", "type": "issue_create",
             "parameters": {"target_repo": "org/repo", "title": "Crash",
                            "body": "It crashes", "gitlab_issue_id": 42,
                            "original_author": "jdoe"}},
            {"id": "a2", "type": "issue_comment_add",
             "parameters": {"target_repo": "org/repo", "body": "me too",
                            "gitlab_issue_id": 42}}
        ]"#,
    )
    .unwrap();

    let orchestrator = ApplyOrchestrator::new(client(&server));
    let mut ctx = ApplyContext::new(Credentials::default());
    let report = orchestrator
        .run(&plan, &mut ctx, &fast_options(false))
        .await
        .unwrap();

    assert!(report.success, "report: {report:?}");
    assert_eq!(ctx.id_mapping("issue", "42"), Some(&json!(7)));
    assert_eq!(report.results[1].outputs["issue_number"], 7);
}

#[tokio::test]
async fn comment_without_a_mapping_fails_with_a_descriptive_error() {
    let server = MockServer::start().await;

    let plan = ActionPlan::from_json(
        r#"[{"id": "a1", "type": "issue_comment_add",
             "parameters": {"target_repo": "org/repo", "body": "hello",
                            "gitlab_issue_id": 99}}]"#,
    )
    .unwrap();

    let orchestrator = ApplyOrchestrator::new(client(&server));
    let mut ctx = ApplyContext::new(Credentials::default());
    let report = orchestrator
        .run(&plan, &mut ctx, &fast_options(false))
        .await
        .unwrap();

    assert!(!report.success);
    let error = report.results[0].error.as_deref().unwrap();
    assert!(error.contains("Could not resolve issue number"), "{error}");
}

#[tokio::test]
async fn idempotency_key_replays_without_a_second_side_effect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/issues"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "number": 3,
            "html_url": "https://destination.example.com/org/repo/issues/3"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let registry = forgeshift_apply::ActionRegistry::with_builtin_actions();
    let spec = forgeshift_apply::ActionSpec {
        id: "a1".to_string(),
        action_type: "issue_create".to_string(),
        parameters: json!({"target_repo": "org/repo", "title": "Once"}),
        idempotency_key: Some("issue-once".to_string()),
    };
    let action = registry.build(spec).unwrap();
    let mut ctx = ApplyContext::new(Credentials::default());
    let options = RetryOptions {
        max_retries: 1,
        ..RetryOptions::default()
    };

    let first = execute_with_retry(action.as_ref(), &client, &mut ctx, options).await;
    let second = execute_with_retry(action.as_ref(), &client, &mut ctx, options).await;

    assert!(first.success);
    assert!(second.success);
    assert_eq!(
        first.outputs["issue_number"],
        second.outputs["issue_number"]
    );
    // wiremock's expect(1) verifies the side effect happened once.
}

#[tokio::test]
async fn failure_mid_plan_rolls_back_executed_actions_in_reverse() {
    let server = MockServer::start().await;
    // Repo creation succeeds.
    Mock::given(method("POST"))
        .and(path("/orgs/org/repos"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "full_name": "org/repo",
            "html_url": "https://destination.example.com/org/repo",
            "id": 5150
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Webhook creation fails terminally.
    Mock::given(method("POST"))
        .and(path("/repos/org/repo/hooks"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "missing"})))
        .expect(1)
        .mount(&server)
        .await;
    // Rollback deletes the repository.
    Mock::given(method("DELETE"))
        .and(path("/repos/org/repo"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let plan = ActionPlan::from_json(
        r#"[
            {"id": "a1", "type": "repo_create",
             "parameters": {"org": "org", "name": "repo"}},
            {"id": "a2", "type": "webhook_create",
             "parameters": {"target_repo": "org/repo", "url": "https://hooks.example.com/x"}}
        ]"#,
    )
    .unwrap();

    let orchestrator = ApplyOrchestrator::new(client(&server));
    let mut ctx = ApplyContext::new(Credentials::default());
    let options = ApplyOptions {
        rollback_on_abort: true,
        ..fast_options(false)
    };
    let report = orchestrator.run(&plan, &mut ctx, &options).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.failed, 1);
    assert_eq!(report.executed, 1);
    // The DELETE expectation on the mock server verifies rollback ran.
}

#[tokio::test]
async fn unknown_plan_type_aborts_before_any_execution() {
    let server = MockServer::start().await;
    let plan =
        ActionPlan::from_json(r#"[{"id": "a1", "type": "warp_drive", "parameters": {}}]"#).unwrap();

    let orchestrator = ApplyOrchestrator::new(client(&server));
    let mut ctx = ApplyContext::new(Credentials::default());
    let err = orchestrator
        .run(&plan, &mut ctx, &fast_options(false))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown action types"));
}

#[tokio::test]
async fn unsupported_capabilities_succeed_with_a_manual_note() {
    let server = MockServer::start().await;
    let plan = ActionPlan::from_json(
        r#"[
            {"id": "a1", "type": "label_create",
             "parameters": {"target_repo": "org/repo", "name": "bug"}},
            {"id": "a2", "type": "secret_set",
             "parameters": {"target_repo": "org/repo", "name": "DEPLOY_KEY"}},
            {"id": "a3", "type": "package_publish",
             "parameters": {"name": "libfoo", "package_type": "maven"}}
        ]"#,
    )
    .unwrap();

    let orchestrator = ApplyOrchestrator::new(client(&server));
    let mut ctx = ApplyContext::new(Credentials::default());
    let report = orchestrator
        .run(&plan, &mut ctx, &fast_options(false))
        .await
        .unwrap();

    assert!(report.success);
    for result in &report.results {
        assert!(result.success);
        assert!(result.outputs["manual_follow_up"].is_string());
    }
}
