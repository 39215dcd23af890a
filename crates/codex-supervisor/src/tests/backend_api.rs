use crate::tests::free_port;
use crate::{BackendApi, HealthCheckResult, HttpBackendApi, Liveness, ShutdownTimeout};

use std::time::Duration;

use googletest::assert_that;
use googletest::prelude::eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn health_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

fn api() -> HttpBackendApi {
    HttpBackendApi::new("127.0.0.1").unwrap()
}

// =========================================================================
// Health
// =========================================================================

#[tokio::test]
async fn given_healthy_backend_when_probed_then_status_200_and_ready() {
    // Given
    let server = health_server(200).await;

    // When
    let result = api().health(server.address().port(), TIMEOUT).await;

    // Then
    assert_eq!(result, HealthCheckResult::Status(200));
    assert!(result.is_ready());
}

#[tokio::test]
async fn given_auth_rejection_when_probed_then_alive_but_not_ready() {
    // Given
    let server = health_server(401).await;

    // When
    let result = api().health(server.address().port(), TIMEOUT).await;

    // Then
    assert!(!result.is_ready());
    assert_that!(result.liveness(), eq(Liveness::Alive));
}

#[tokio::test]
async fn given_nothing_listening_when_probed_then_refused_and_dead() {
    // When
    let result = api().health(free_port(), TIMEOUT).await;

    // Then
    assert_eq!(result, HealthCheckResult::Refused);
    assert_that!(result.liveness(), eq(Liveness::Dead));
}

#[tokio::test]
async fn given_slow_backend_when_probed_then_timed_out() {
    // Given
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    // When
    let result = api()
        .health(server.address().port(), Duration::from_millis(100))
        .await;

    // Then
    assert_eq!(result, HealthCheckResult::TimedOut);
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn given_202_with_timeout_when_shutdown_requested_then_declared_timeout() {
    // Given
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/shutdown"))
        .respond_with(ResponseTemplate::new(202).set_body_string(r#"{"timeout": 12.5}"#))
        .expect(1)
        .mount(&server)
        .await;

    // When
    let result = api()
        .request_shutdown(server.address().port(), TIMEOUT)
        .await;

    // Then
    assert_eq!(
        result.unwrap(),
        ShutdownTimeout::Declared(Duration::from_millis(12_500))
    );
}

#[tokio::test]
async fn given_202_without_body_when_shutdown_requested_then_unspecified_timeout() {
    // Given
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/shutdown"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    // When
    let result = api()
        .request_shutdown(server.address().port(), TIMEOUT)
        .await;

    // Then
    assert_eq!(result.unwrap(), ShutdownTimeout::Unspecified);
}

#[tokio::test]
async fn given_error_status_when_shutdown_requested_then_shutdown_error() {
    // Given
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/shutdown"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    // When
    let result = api()
        .request_shutdown(server.address().port(), TIMEOUT)
        .await;

    // Then
    let error = result.unwrap_err();
    assert!(error.is_transient());
    assert!(error.to_string().contains("503"));
}

#[tokio::test]
async fn given_nothing_listening_when_shutdown_requested_then_error() {
    let result = api().request_shutdown(free_port(), TIMEOUT).await;
    assert!(result.is_err());
}

// =========================================================================
// Body parsing
// =========================================================================

#[test]
fn given_timeout_bodies_when_parsed_then_only_valid_seconds_are_declared() {
    assert_that!(
        ShutdownTimeout::from_body(r#"{"timeout": 5}"#),
        eq(ShutdownTimeout::Declared(Duration::from_secs(5)))
    );
    assert_that!(
        ShutdownTimeout::from_body(r#"{"timeout": 0}"#),
        eq(ShutdownTimeout::Declared(Duration::ZERO))
    );
    assert_that!(
        ShutdownTimeout::from_body(r#"{"timeout": -1}"#),
        eq(ShutdownTimeout::Unspecified)
    );
    assert_that!(
        ShutdownTimeout::from_body(r#"{"status": "ok"}"#),
        eq(ShutdownTimeout::Unspecified)
    );
    assert_that!(ShutdownTimeout::from_body("bye"), eq(ShutdownTimeout::Unspecified));
}

#[test]
fn given_unspecified_timeout_when_or_default_then_fallback_used() {
    let fallback = Duration::from_secs(30);
    assert_that!(ShutdownTimeout::Unspecified.or_default(fallback), eq(fallback));
    assert_that!(
        ShutdownTimeout::Declared(Duration::from_secs(3)).or_default(fallback),
        eq(Duration::from_secs(3))
    );
}
