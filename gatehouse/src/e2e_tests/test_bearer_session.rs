//! Bearer sessions: a signed token in the `Authorization` header.

use axum::http::{HeaderMap, StatusCode, header::CONTENT_TYPE};
use std::time::Duration;

use crate::bearer;
use crate::claims::ClaimStore;
use crate::config::SecurityConfig;
use crate::signatory::Signatory;

use super::helpers::{TestApp, body_string, security};

fn authorization(token: &str) -> String {
    let mut headers = HeaderMap::new();
    bearer::set_header(&mut headers, token).expect("valid header");
    headers
        .get(bearer::HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("authorization header")
        .to_string()
}

#[tokio::test]
async fn test_issued_token_authenticates() {
    let app = TestApp::new();

    let response = app.get("/token?user=alice", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some(bearer::CONTENT_TYPE)
    );
    let token = body_string(response).await;

    let response = app
        .get("/api/whoami", &[("authorization", authorization(&token).as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "alice");
}

#[tokio::test]
async fn test_missing_header_is_unauthorized() {
    let app = TestApp::new();

    let response = app.get("/api/whoami", &[]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_token_is_unauthorized() {
    let app = TestApp::new();

    let response = app.get("/api/whoami", &[("authorization", "Bearer ")]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_foreign_token_is_unauthorized() {
    let app = TestApp::new();
    let foreign = Signatory::new(Duration::from_secs(60))
        .with_secret("not-the-e2e-secret")
        .sign(&ClaimStore::new(), &[])
        .expect("signed token");

    let response = app
        .get("/api/whoami", &[("authorization", authorization(&foreign).as_str())])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cookie_does_not_satisfy_bearer_route() {
    let app = TestApp::new();

    let response = app.get("/login?user=alice&password=wonderland", &[]).await;
    let cookie = super::helpers::session_cookie(&response).expect("session cookie");

    let response = app.get("/api/whoami", &[("cookie", cookie.as_str())]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_failure_is_server_error() {
    let app = TestApp::with_security(&SecurityConfig {
        session_ttl: Duration::ZERO,
        ..security()
    });

    let response = app.get("/token?user=alice", &[]).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Internal Server Error");
}
