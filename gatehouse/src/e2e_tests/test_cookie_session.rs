//! Cookie sessions: login drops a cookie, protected routes accept it, logout
//! expires it.

use axum::http::{StatusCode, header::LOCATION};

use super::helpers::{TestApp, body_string, session_cookie, set_cookies};

#[tokio::test]
async fn test_login_then_access_protected_route() {
    let app = TestApp::new();

    let response = app.get("/login?user=alice&password=wonderland", &[]).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(set_cookies(&response).len(), 1);
    let cookie = session_cookie(&response).expect("session cookie");

    let response = app.get("/whoami", &[("cookie", cookie.as_str())]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "alice");
}

#[tokio::test]
async fn test_failed_login_drops_no_cookie() {
    let app = TestApp::new();

    let response = app.get("/login?user=alice&password=wrong", &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_missing_cookie_is_unauthorized() {
    let app = TestApp::new();

    let response = app.get("/whoami", &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "Unauthorized");
}

#[tokio::test]
async fn test_garbage_cookie_is_unauthorized() {
    let app = TestApp::new();

    let response = app.get("/whoami", &[("cookie", "GatehouseAuth=garbage")]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unauthenticated_redirects_when_configured() {
    let app = TestApp::new();

    let response = app.get("/account", &[]).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
        Some("/login")
    );
}

#[tokio::test]
async fn test_cookie_from_other_secret_is_rejected() {
    let other = TestApp::with_security(&crate::config::SecurityConfig {
        secret: "another-secret".to_string(),
        ..super::helpers::security()
    });
    let response = other.get("/login?user=alice&password=wonderland", &[]).await;
    let cookie = session_cookie(&response).expect("session cookie");

    let app = TestApp::new();
    let response = app.get("/whoami", &[("cookie", cookie.as_str())]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_expires_cookie() {
    let app = TestApp::new();

    let response = app.get("/logout", &[]).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("GatehouseAuth=;"));
    assert!(cookies[0].contains("Max-Age=-1"));
}
