//! Login latency does not depend on whether the credentials were valid.

use std::time::Instant;

use axum::http::StatusCode;

use super::helpers::{LOGIN_TIMEBOX, TestApp};

#[tokio::test]
async fn test_successful_login_is_timeboxed() {
    let app = TestApp::new();

    let start = Instant::now();
    let response = app.get("/login?user=alice&password=wonderland", &[]).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(start.elapsed() >= LOGIN_TIMEBOX);
}

#[tokio::test]
async fn test_failed_logins_are_timeboxed() {
    let app = TestApp::new();

    for uri in [
        "/login?user=alice&password=wrong",
        "/login?user=nobody&password=wonderland",
        "/login?user=nobody",
    ] {
        let start = Instant::now();
        let response = app.get(uri, &[]).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(start.elapsed() >= LOGIN_TIMEBOX, "{uri} returned early");
    }
}

#[tokio::test]
async fn test_concurrent_logins_wait_independently() {
    let app = TestApp::new();

    let start = Instant::now();
    let (first, second) = tokio::join!(
        app.get("/login?user=alice&password=wonderland", &[]),
        app.get("/login?user=alice&password=wrong", &[]),
    );

    assert_eq!(first.status(), StatusCode::NO_CONTENT);
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    let elapsed = start.elapsed();
    assert!(elapsed >= LOGIN_TIMEBOX);
    // Both waits overlap rather than running back to back.
    assert!(elapsed < LOGIN_TIMEBOX * 2);
}
