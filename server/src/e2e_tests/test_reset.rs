//! Test: `/reset` validation, defaults and the wait for an in-flight run.

use std::time::{Duration, Instant};

use super::helpers::TestServer;
use crate::protocol::PollingMethod;
use crate::status::RunStatus;

#[tokio::test]
async fn test_reset_confirmation() {
    let server = TestServer::start(PollingMethod::ShortPolling).await;

    let response = server.reset(r#"{"sim_time": 1, "err_rate": 0.2}"#).await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.json(),
        serde_json::json!({"message": "Fields updated successfully"})
    );
    assert_eq!(server.get_status().await.result(), "pending");
}

#[tokio::test]
async fn test_non_post_methods_rejected() {
    let server = TestServer::start(PollingMethod::ShortPolling).await;

    for method in ["GET", "PUT", "DELETE"] {
        let response = server.request(method, "/reset", "").await;
        assert_eq!(response.status, 405, "{method}");
    }
    assert_eq!(server.simulation.run_id(), 0);
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let server = TestServer::start(PollingMethod::ShortPolling).await;

    for body in ["", "{", "not json", r#"{"sim_time": "soon"}"#] {
        let response = server.reset(body).await;
        assert_eq!(response.status, 400, "{body:?}");
        assert_eq!(response.body, "Invalid JSON body");
    }
    assert_eq!(server.simulation.status(), RunStatus::Init);
    assert_eq!(server.simulation.run_id(), 0);
}

#[tokio::test]
async fn test_out_of_range_error_rate_rejected() {
    let server = TestServer::start(PollingMethod::ShortPolling).await;

    let response = server.reset(r#"{"err_rate": 1.5}"#).await;

    assert_eq!(response.status, 400);
    assert_eq!(server.simulation.status(), RunStatus::Init);
}

#[tokio::test]
async fn test_omitted_fields_use_defaults_not_previous_values() {
    let server = TestServer::start(PollingMethod::ShortPolling).await;
    server
        .reset(r#"{"sim_time": 0, "err_rate": 0.9, "server_wait": 50}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.reset("{}").await;

    let params = server.simulation.params();
    assert_eq!(params.delay, Duration::from_secs(5));
    assert!((params.error_rate - 0.1).abs() < f64::EPSILON);
    assert_eq!(params.response_latency, Duration::ZERO);
    assert_eq!(params.wait_timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn test_reset_during_pending_waits_for_resolution() {
    let server = TestServer::start(PollingMethod::ShortPolling).await;
    server.start_run(600, 0.0);

    let started = Instant::now();
    let response = server.reset(r#"{"sim_time": 0, "err_rate": 1}"#).await;
    let elapsed = started.elapsed();

    assert_eq!(response.status, 200);
    assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
    assert_eq!(server.simulation.run_id(), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.get_status().await.result(), "error");
}

#[tokio::test]
async fn test_reset_survives_client_disconnect() {
    let server = TestServer::start(PollingMethod::ShortPolling).await;
    server.start_run(600, 0.0);

    let connection = server
        .send("POST", "/reset", r#"{"sim_time": 0, "err_rate": 1}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(connection);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(server.simulation.run_id(), 2);
    assert_eq!(server.simulation.status(), RunStatus::Error);
}
