//! Integration tests for requests and sessions holding several profiles.

use axum::body::Body;
use http::header::{AUTHORIZATION, HOST};
use http::{Request, StatusCode};
use portcullis::SecurityConfig;

use crate::common::{CONFIG, TestHarness, basic, body_string};

fn harness_with_callback_multi_profile(multi_profile: bool) -> TestHarness {
    let mut config = SecurityConfig::from_toml_str(CONFIG).unwrap();
    config.callback.multi_profile = multi_profile;
    TestHarness::with_config(config)
}

#[tokio::test]
async fn test_stateless_direct_clients_each_contribute_a_profile() {
    let harness = TestHarness::new();
    let req = Request::builder()
        .uri("/api/all")
        .header(HOST, "localhost:8080")
        .header("X-Api-Key", "key-1")
        .header(AUTHORIZATION, basic("testUser", "testUser"))
        .body(Body::empty())
        .unwrap();
    let resp = harness.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ApiKey,BasicClient");
}

#[tokio::test]
async fn test_stateless_failed_client_is_skipped() {
    let harness = TestHarness::new();
    let req = Request::builder()
        .uri("/api/all")
        .header("X-Api-Key", "revoked")
        .header(AUTHORIZATION, basic("testUser", "testUser"))
        .body(Body::empty())
        .unwrap();
    let resp = harness.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "BasicClient");
}

#[tokio::test]
async fn test_second_login_keeps_first_profile_with_multi_profile() {
    let harness = harness_with_callback_multi_profile(true);
    let first = harness.login("ST-1").await;
    let second = harness.callback("OtherCas", "ST-2", &first).await;

    let resp = harness.get("/profiles", Some(&second)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "CasClient,OtherCas");
    // The session answers to its latest ticket only.
    assert_eq!(harness.tickets.len().await, 1);
}

#[tokio::test]
async fn test_second_login_replaces_first_profile_without_multi_profile() {
    let harness = harness_with_callback_multi_profile(false);
    let first = harness.login("ST-1").await;
    let second = harness.callback("OtherCas", "ST-2", &first).await;

    let resp = harness.get("/profiles", Some(&second)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "OtherCas");
}
