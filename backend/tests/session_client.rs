use httpmock::prelude::*;
use serde_json::json;
use sessionguard_backend::{
    client::{ClientError, HeartbeatStatus, HttpSessionApi, SessionApi},
    services::{InvalidReason, ValidityVerdict},
};
use std::time::Duration;

async fn signed_in_api(server: &MockServer) -> HttpSessionApi {
    let api = HttpSessionApi::new(&server.base_url(), Duration::from_secs(2)).expect("client");
    api.set_access_token("device-token").await;
    api
}

#[tokio::test]
async fn heartbeat_reports_active_device() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/auth/track-session")
                .header("authorization", "Bearer device-token");
            then.status(200)
                .json_body(json!({ "revoked": false, "created": true, "session_id": "6f1f0f8e-0f7e-4f47-8d43-0b2a6e3b7e11" }));
        })
        .await;

    let api = signed_in_api(&server).await;
    let status = api.heartbeat().await.expect("heartbeat");
    assert_eq!(status, HeartbeatStatus::Active { created: true });
    mock.assert_async().await;
}

#[tokio::test]
async fn forbidden_heartbeat_means_revoked_even_without_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/track-session");
            then.status(403);
        })
        .await;

    let api = signed_in_api(&server).await;
    assert_eq!(
        api.heartbeat().await.expect("heartbeat"),
        HeartbeatStatus::Revoked
    );
}

#[tokio::test]
async fn revoked_flag_in_ok_body_means_revoked() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/auth/track-session");
            then.status(200).json_body(json!({ "revoked": true }));
        })
        .await;

    let api = signed_in_api(&server).await;
    assert_eq!(
        api.heartbeat().await.expect("heartbeat"),
        HeartbeatStatus::Revoked
    );
}

#[tokio::test]
async fn validity_check_parses_reason() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/sessions/check")
                .header("authorization", "Bearer device-token");
            then.status(200)
                .json_body(json!({ "valid": false, "reason": "revoked" }));
        })
        .await;

    let api = signed_in_api(&server).await;
    let verdict = api.check_validity().await.expect("check");
    assert_eq!(verdict, ValidityVerdict::invalid(InvalidReason::Revoked));
}

#[tokio::test]
async fn service_unavailable_is_an_error_not_a_verdict() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/sessions/check");
            then.status(503)
                .json_body(json!({ "error": "Session store temporarily unavailable", "code": "TRANSIENT_STORAGE_ERROR" }));
        })
        .await;

    let api = signed_in_api(&server).await;
    let err = api.check_validity().await.expect_err("transient");
    assert!(matches!(err, ClientError::UnexpectedStatus(status) if status.as_u16() == 503));
}

#[tokio::test]
async fn no_request_is_sent_without_credentials() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.any_request();
            then.status(200);
        })
        .await;

    let api = HttpSessionApi::new(&server.base_url(), Duration::from_secs(2)).expect("client");
    assert!(matches!(
        api.heartbeat().await,
        Err(ClientError::MissingCredentials)
    ));
    mock.assert_hits_async(0).await;
}
