//! Integration tests for the redirect, callback and session-backed access.

use http::StatusCode;
use portcullis::profile_manager::REQUESTED_URL_KEY;
use portcullis::SessionStore;

use crate::common::{TestHarness, body_string, location, session_cookie};

fn session_id(cookie: &str) -> &str {
    cookie.split_once('=').map(|(_, id)| id).unwrap()
}

#[tokio::test]
async fn test_first_request_redirects_to_provider() {
    let harness = TestHarness::new();
    let resp = harness.get("/private?tab=2", None).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        location(&resp),
        "https://cas.example.com/login?service=http%3A%2F%2Flocalhost%3A8080%2Fcallback%3Fclient_name%3DCasClient"
    );

    let cookie = session_cookie(&resp).unwrap();
    let stored = harness
        .sessions
        .load(session_id(&cookie))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.get(REQUESTED_URL_KEY).and_then(|v| v.as_str()),
        Some("http://localhost:8080/private?tab=2")
    );
}

#[tokio::test]
async fn test_callback_stores_profile_and_returns_to_requested_url() {
    let harness = TestHarness::new();
    let challenge = harness.get("/private", None).await;
    let cookie = session_cookie(&challenge).unwrap();

    let callback = harness
        .get("/callback?client_name=CasClient&ticket=ST-1", Some(&cookie))
        .await;
    assert_eq!(callback.status(), StatusCode::FOUND);
    assert_eq!(location(&callback), "http://localhost:8080/private");

    let renewed = session_cookie(&callback).unwrap();
    assert_ne!(renewed, cookie);
    let stored = harness
        .sessions
        .load(session_id(&renewed))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.get(REQUESTED_URL_KEY).is_none());
    assert!(
        harness
            .sessions
            .load(session_id(&cookie))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_authenticated_session_skips_provider() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-1").await;

    let resp = harness.get("/private", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "jdoe");
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-2").await;

    let resp = harness.get("/admin", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_string(resp).await, "forbidden");
}

#[tokio::test]
async fn test_permission_grants_admin() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-ADMIN-1").await;

    let resp = harness.get("/admin", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "root");
}

#[tokio::test]
async fn test_rejected_ticket_leaves_user_anonymous() {
    let harness = TestHarness::new();
    let challenge = harness.get("/private", None).await;
    let cookie = session_cookie(&challenge).unwrap();

    let callback = harness
        .get("/callback?client_name=CasClient&ticket=bogus", Some(&cookie))
        .await;
    assert_eq!(callback.status(), StatusCode::FOUND);
    assert_eq!(location(&callback), "/");

    let resp = harness.get("/private", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(location(&resp).starts_with("https://cas.example.com/login"));
}

#[tokio::test]
async fn test_unknown_session_cookie_starts_fresh() {
    let harness = TestHarness::new();
    let resp = harness
        .get("/private", Some("portcullis.sid=does-not-exist"))
        .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let cookie = session_cookie(&resp).unwrap();
    assert_ne!(session_id(&cookie), "does-not-exist");
}
