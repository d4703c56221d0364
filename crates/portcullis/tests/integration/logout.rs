//! Integration tests for application logout.

use http::StatusCode;

use crate::common::{TestHarness, location};

#[tokio::test]
async fn test_logout_then_challenge_again() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-1").await;
    assert_eq!(harness.tickets.len().await, 1);

    let resp = harness.get("/logout?url=/goodbye", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/goodbye");
    assert!(harness.tickets.is_empty().await);

    let resp = harness.get("/private", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(location(&resp).starts_with("https://cas.example.com/login"));
}

#[tokio::test]
async fn test_logout_rejects_foreign_target() {
    let harness = TestHarness::new();
    let cookie = harness.login("ST-1").await;

    let resp = harness
        .get("/logout?url=https://evil.example.com/", Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn test_logout_without_session_cookie() {
    let harness = TestHarness::new();
    let resp = harness.get("/logout", None).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
}
