//! HTTP executor behaviour against a mock backend.

mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use support::make_operation;
use tideline_core::ports::OperationExecutor;
use tideline_core::sync::{DispatchError, FailureKind};
use tideline_domain::Priority;
use tideline_infra::http::{HttpExecutor, HttpExecutorConfig, TokenSource};
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StaticToken(&'static str);

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

fn executor_for(server: &MockServer) -> HttpExecutor {
    let config = HttpExecutorConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(2),
        ..HttpExecutorConfig::default()
    };
    HttpExecutor::new(&config, Method::POST, "/journal/entries").expect("executor built")
}

#[tokio::test]
async fn successful_dispatch_sends_payload_and_idempotency_key() {
    let server = MockServer::start().await;
    let op = make_operation("op-1", Priority::Normal, 1_755_000_000);

    Mock::given(method("POST"))
        .and(path("/journal/entries"))
        .and(header("Idempotency-Key", "op-1"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(serde_json::json!({ "entry": "offline note", "tags": ["test"] })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    executor_for(&server).execute(&op).await.expect("dispatch succeeds");
}

#[tokio::test]
async fn bearer_token_is_attached_when_a_source_is_configured() {
    let server = MockServer::start().await;
    let op = make_operation("op-1", Priority::Normal, 1_755_000_000);

    Mock::given(method("POST"))
        .and(header("Authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server).with_token_source(Arc::new(StaticToken("token-123")));
    executor.execute(&op).await.expect("dispatch succeeds");
}

#[tokio::test]
async fn unauthenticated_requests_carry_no_authorization_header() {
    let server = MockServer::start().await;
    let op = make_operation("op-1", Priority::Normal, 1_755_000_000);

    Mock::given(method("POST"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    executor_for(&server).execute(&op).await.expect("dispatch succeeds");
}

#[tokio::test]
async fn auth_failure_maps_to_auth_expired() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(401)).mount(&server).await;

    let err = executor_for(&server)
        .execute(&make_operation("op-1", Priority::Normal, 0))
        .await
        .expect_err("401 fails");
    assert_eq!(err.kind(), FailureKind::AuthExpired);
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

    let err = executor_for(&server)
        .execute(&make_operation("op-1", Priority::Normal, 0))
        .await
        .expect_err("503 fails");
    assert!(matches!(err, DispatchError::Server(_)));
    assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn client_error_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(422)).mount(&server).await;

    let err = executor_for(&server)
        .execute(&make_operation("op-1", Priority::Normal, 0))
        .await
        .expect_err("422 fails");
    assert!(matches!(err, DispatchError::Client(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rate_limiting_is_retried_later() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(429)).mount(&server).await;

    let err = executor_for(&server)
        .execute(&make_operation("op-1", Priority::Normal, 0))
        .await
        .expect_err("429 fails");
    assert!(matches!(err, DispatchError::RateLimit(_)));
    assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn connection_failure_maps_to_network_error() {
    // Bind and drop a listener so the port refuses connections.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = HttpExecutorConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_secs(1),
        ..HttpExecutorConfig::default()
    };
    let executor = HttpExecutor::new(&config, Method::POST, "/journal/entries").unwrap();

    let err = executor
        .execute(&make_operation("op-1", Priority::Normal, 0))
        .await
        .expect_err("unreachable endpoint fails");
    assert!(matches!(err, DispatchError::Network(_)));
    assert_eq!(err.kind(), FailureKind::Transient);
}
