//! Behavior tests for the source client: pagination, retry, accounting

use forgeshift_client::{ClientOptions, GitLabClient};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GitLabClient {
    GitLabClient::new(&server.uri(), "test-token", ClientOptions::default()).unwrap()
}

fn fast_client(server: &MockServer) -> GitLabClient {
    GitLabClient::new(
        &server.uri(),
        "test-token",
        ClientOptions {
            max_retries: 3,
            ..ClientOptions::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn get_sends_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/version"))
        .and(wiremock::matchers::header("PRIVATE-TOKEN", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "16.0"})))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).get("/api/v4/version", &[]).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body["version"], "16.0");
}

#[tokio::test]
async fn paginate_follows_next_page_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/groups/1/projects"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Next-Page", "2")
                .set_body_json(json!([{"id": 1}, {"id": 2}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/groups/1/projects"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Next-Page", "")
                .set_body_json(json!([{"id": 3}])),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let stream = client.paginate("/api/v4/groups/1/projects", &[], 100, None);
    futures::pin_mut!(stream);
    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        ids.push(item.unwrap()["id"].as_u64().unwrap());
    }
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn paginate_stops_at_max_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/9/issues"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Next-Page", "2")
                .set_body_json(json!([{"id": 1}, {"id": 2}, {"id": 3}])),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let stream = client.paginate("/api/v4/projects/9/issues", &[], 100, Some(2));
    futures::pin_mut!(stream);
    let mut count = 0;
    while let Some(item) = stream.next().await {
        item.unwrap();
        count += 1;
    }
    assert_eq!(count, 2);
}

#[tokio::test]
async fn retry_on_429_then_success_counts_both_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let response = client.get("/api/v4/projects", &[]).await.unwrap();
    assert_eq!(response.status, 200);

    let snap = client.stats().snapshot();
    assert_eq!(snap.total_calls, 2);
    assert_eq!(snap.retried_calls, 1);
    assert_eq!(snap.successful_calls, 1);
    assert_eq!(snap.failed_calls, 0);
}

#[tokio::test]
async fn no_retry_on_plain_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/5"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let response = client.get("/api/v4/projects/5", &[]).await.unwrap();
    assert_eq!(response.status, 404);

    let snap = client.stats().snapshot();
    assert_eq!(snap.total_calls, 1);
    assert_eq!(snap.retried_calls, 0);
    assert_eq!(snap.failed_calls, 1);
}

#[tokio::test]
async fn paginated_count_prefers_x_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/7/merge_requests"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Total", "512")
                .set_body_json(json!([{"id": 1}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let (count, exact) = client
        .paginated_count("/api/v4/projects/7/merge_requests", &[], Some(1000))
        .await
        .unwrap();
    assert_eq!(count, 512);
    assert!(exact);
}

#[tokio::test]
async fn paginated_count_falls_back_to_walking() {
    let server = MockServer::start().await;
    // No X-Total header anywhere; two items across two pages.
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/7/issues"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Next-Page", "2")
                .set_body_json(json!([{"id": 1}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/7/issues"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 2}])))
        .mount(&server)
        .await;

    let client = client(&server);
    let (count, exact) = client
        .paginated_count("/api/v4/projects/7/issues", &[], Some(1000))
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert!(exact);
}
