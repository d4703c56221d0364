//! Integration tests for provider-initiated logout.

use axum::body::Body;
use http::header::{CONTENT_TYPE, HOST};
use http::{Request, StatusCode};

use crate::common::{
    TestHarness, deflated_logout_request, location, logout_form, logout_request,
};

fn back_channel(ticket: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/logout/back-channel")
        .header(HOST, "localhost:8080")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(logout_form(&logout_request(ticket))))
        .unwrap()
}

#[tokio::test]
async fn test_back_channel_logout_strips_correlated_session() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-77").await;
    assert_eq!(harness.tickets.len().await, 1);

    let resp = harness.send(back_channel("ST-77")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(harness.tickets.is_empty().await);

    let resp = harness.get("/private", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(location(&resp).starts_with("https://cas.example.com/login"));
}

#[tokio::test]
async fn test_back_channel_resubmission_is_noop() {
    let harness = TestHarness::new();
    harness.login("ST-77").await;

    assert_eq!(harness.send(back_channel("ST-77")).await.status(), StatusCode::OK);
    assert_eq!(harness.send(back_channel("ST-77")).await.status(), StatusCode::OK);
    assert!(harness.tickets.is_empty().await);
}

#[tokio::test]
async fn test_back_channel_unknown_ticket_is_noop() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-1").await;

    let resp = harness.send(back_channel("ST-unknown")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(harness.tickets.len().await, 1);
    assert_eq!(harness.get("/private", Some(&cookie)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_back_channel_through_callback_url() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-5").await;

    let req = Request::builder()
        .method("POST")
        .uri("/callback")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(logout_form(&logout_request("ST-5"))))
        .unwrap();
    assert_eq!(harness.send(req).await.status(), StatusCode::OK);
    assert_eq!(
        harness.get("/private", Some(&cookie)).await.status(),
        StatusCode::FOUND
    );
}

#[tokio::test]
async fn test_front_channel_logout_with_deflated_payload() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-9").await;

    let query = logout_form(&deflated_logout_request("ST-9"));
    let resp = harness
        .get(&format!("/callback?{query}"), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(harness.tickets.is_empty().await);
    assert_eq!(
        harness.get("/private", Some(&cookie)).await.status(),
        StatusCode::FOUND
    );
}

#[tokio::test]
async fn test_destroy_session_on_single_logout() {
    let mut config =
        portcullis::SecurityConfig::from_toml_str(crate::common::CONFIG).unwrap();
    config.single_logout.destroy_session = true;
    let harness = TestHarness::with_config(config);
    harness.login("ST-3").await;
    assert_eq!(harness.sessions.len().await, 1);

    harness.send(back_channel("ST-3")).await;
    assert!(harness.sessions.is_empty().await);
}
