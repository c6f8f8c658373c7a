//! Services without a configured secret share the process fallback secret.

use axum::http::StatusCode;

use crate::config::SecurityConfig;

use super::helpers::{TestApp, body_string, security, session_cookie};

fn random_secret() -> SecurityConfig {
    SecurityConfig {
        secret: String::new(),
        ..security()
    }
}

#[tokio::test]
async fn test_apps_without_secret_accept_each_others_cookies() {
    let issuer = TestApp::with_security(&random_secret());
    let verifier = TestApp::with_security(&random_secret());

    let response = issuer.get("/login?user=alice&password=wonderland", &[]).await;
    let cookie = session_cookie(&response).expect("session cookie");

    let response = verifier.get("/whoami", &[("cookie", cookie.as_str())]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "alice");
}

#[tokio::test]
async fn test_explicit_secret_rejects_fallback_cookie() {
    let issuer = TestApp::with_security(&random_secret());
    let verifier = TestApp::new();

    let response = issuer.get("/login?user=alice&password=wonderland", &[]).await;
    let cookie = session_cookie(&response).expect("session cookie");

    let response = verifier.get("/whoami", &[("cookie", cookie.as_str())]).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
