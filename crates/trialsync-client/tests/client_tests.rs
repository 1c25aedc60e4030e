//! Integration tests for the vault query client against a mocked vault.

use serde_json::json;
use trialsync_client::{VaultClient, VaultError};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> VaultClient {
    VaultClient::with_http_client(
        server.uri(),
        "v24.1".to_string(),
        reqwest::Client::new(),
        "test-session".to_string(),
    )
}

#[tokio::test]
async fn query_concatenates_all_pages_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v24.1/query"))
        .and(body_string_contains("FROM+study__v"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"name__v": "S1"}, {"name__v": "S2"}],
            "responseDetails": {"next_page": "/api/v24.1/query/abc/page/2"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v24.1/query/abc/page/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"name__v": "S3"}],
            "responseDetails": {"next_page": "/api/v24.1/query/abc/page/3"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v24.1/query/abc/page/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"name__v": "S4"}, {"name__v": "S5"}],
            "responseDetails": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = client_for(&server)
        .query("SELECT name__v FROM study__v")
        .await
        .unwrap();

    let names: Vec<&str> = records
        .iter()
        .map(|r| r["name__v"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["S1", "S2", "S3", "S4", "S5"]);
}

#[tokio::test]
async fn expired_session_mid_pagination_aborts_without_partial_results() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v24.1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"name__v": "S1"}],
            "responseDetails": {"next_page": "/api/v24.1/query/abc/page/2"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v24.1/query/abc/page/2"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{"type": "INVALID_SESSION_ID", "message": "Invalid or expired session ID."}]
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).query("SELECT name__v FROM study__v").await;
    assert!(matches!(result, Err(VaultError::SessionExpired)));
}

#[tokio::test]
async fn non_auth_http_error_carries_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v24.1/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
        .mount(&server)
        .await;

    let result = client_for(&server).query("SELECT name__v FROM study__v").await;
    match result {
        Err(VaultError::Api { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal failure");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn error_objects_in_success_response_fail_the_query() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v24.1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [],
            "errors": [{"type": "MALFORMED_URL", "message": "unknown object"}]
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).query("SELECT x FROM nowhere").await;
    match result {
        Err(VaultError::Query(detail)) => assert!(detail.contains("MALFORMED_URL")),
        other => panic!("expected Query error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_result_set_is_not_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v24.1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [],
            "responseDetails": {}
        })))
        .mount(&server)
        .await;

    let records = client_for(&server)
        .query("SELECT name__v FROM study__v WHERE modified_date__v > '2099-01-01'")
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn authenticate_returns_session_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v24.1/auth"))
        .and(body_string_contains("username=svc-user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "SUCCESS",
            "sessionId": "fresh-session-token"
        })))
        .mount(&server)
        .await;

    let config = trialsync_client::VaultConfig {
        base_url: server.uri(),
        api_version: "v24.1".to_string(),
        session_file: "unused".into(),
        request_timeout_secs: 5,
    };
    let token = VaultClient::authenticate(&config, "svc-user", "secret")
        .await
        .unwrap();
    assert_eq!(token, "fresh-session-token");
}

#[tokio::test]
async fn authenticate_without_session_id_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v24.1/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responseStatus": "FAILURE"
        })))
        .mount(&server)
        .await;

    let config = trialsync_client::VaultConfig {
        base_url: server.uri(),
        api_version: "v24.1".to_string(),
        session_file: "unused".into(),
        request_timeout_secs: 5,
    };
    let result = VaultClient::authenticate(&config, "svc-user", "bad").await;
    assert!(matches!(result, Err(VaultError::Session(_))));
}
