//! Integration tests for direct (stateless) clients and excluded paths.

use axum::body::Body;
use http::header::{AUTHORIZATION, HOST, SET_COOKIE, WWW_AUTHENTICATE};
use http::{Request, StatusCode};

use crate::common::{TestHarness, basic, body_string};

async fn get_with_basic(harness: &TestHarness, username: &str, password: &str) -> axum::response::Response {
    let req = Request::builder()
        .uri("/api/me")
        .header(HOST, "localhost:8080")
        .header(AUTHORIZATION, basic(username, password))
        .body(Body::empty())
        .unwrap();
    harness.send(req).await
}

#[tokio::test]
async fn test_basic_auth_returns_username() {
    let harness = TestHarness::new();
    let resp = get_with_basic(&harness, "testUser", "testUser").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains("testUser"));
}

#[tokio::test]
async fn test_basic_auth_mismatch_is_unauthorized() {
    let harness = TestHarness::new();
    let resp = get_with_basic(&harness, "testUser", "nope").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[WWW_AUTHENTICATE], "Basic realm=\"portcullis\"");
    assert_eq!(body_string(resp).await, "unauthorized");
}

#[tokio::test]
async fn test_missing_credentials_is_unauthorized() {
    let harness = TestHarness::new();
    let resp = harness.get("/api/me", None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stateless_flow_does_not_persist_a_session() {
    let harness = TestHarness::new();
    let resp = get_with_basic(&harness, "testUser", "testUser").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(SET_COOKIE).is_none());
    assert!(harness.sessions.is_empty().await);
}

#[tokio::test]
async fn test_each_request_is_verified_again() {
    let harness = TestHarness::new();
    assert_eq!(
        get_with_basic(&harness, "alice", "alice").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        get_with_basic(&harness, "alice", "bob").await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_excluded_paths_pass_through() {
    let harness = TestHarness::new();

    let resp = harness.get("/public", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "public");

    let resp = harness.get("/assets/app.js", None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Credentials do not change the outcome on an excluded path.
    let req = Request::builder()
        .uri("/public")
        .header(AUTHORIZATION, basic("testUser", "wrong"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(harness.send(req).await.status(), StatusCode::OK);
}
