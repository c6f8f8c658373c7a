//! Base router endpoints and headers.

use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get};

use crate::config::{LimiterConfig, ServerConfig};
use crate::router::{self, CLACKS, COFFEE, PING, RouterError};

use super::helpers::{TestApp, body_string, wrap};

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "done"
}

#[tokio::test]
async fn test_ping() {
    let response = TestApp::new().get(PING, &[]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "pong");
}

#[tokio::test]
async fn test_coffee_is_a_teapot() {
    let response = TestApp::new().get(COFFEE, &[]).await;

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_string(response).await, "I'm a teapot");
}

#[tokio::test]
async fn test_clacks_on_every_response() {
    let app = TestApp::new();

    for uri in [PING, COFFEE, "/whoami", "/missing"] {
        let response = app.get(uri, &[]).await;
        assert_eq!(
            response.headers().get(&CLACKS).and_then(|v| v.to_str().ok()),
            Some("GNU Terry Pratchett, Russel Winder"),
            "no clacks on {uri}"
        );
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = TestApp::new().get("/missing", &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_limiter_trips_per_client() {
    let limiter = LimiterConfig {
        limit: 2,
        ttl: Duration::from_secs(3_600),
        ..LimiterConfig::default()
    };
    let app = TestApp::with_router(wrap(Router::new(), &ServerConfig::default(), &[limiter]));
    let alice = [("x-forwarded-for", "10.0.0.1")];
    let bob = [("x-forwarded-for", "10.0.0.2")];

    assert_eq!(app.get(COFFEE, &alice).await.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(app.get(PING, &alice).await.status(), StatusCode::OK);

    let tripped = app.get(COFFEE, &alice).await;
    assert_eq!(tripped.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(tripped.headers().contains_key(&CLACKS));

    assert_eq!(app.get(COFFEE, &bob).await.status(), StatusCode::IM_A_TEAPOT);
}

#[tokio::test]
async fn test_no_limiter_by_default() {
    let app = TestApp::new();
    for _ in 0..10 {
        assert_eq!(app.get(PING, &[]).await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_write_timeout_aborts_slow_handler() {
    let server = ServerConfig {
        write_timeout: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    let app = TestApp::with_router(wrap(Router::new().route("/slow", get(slow)), &server, &[]));

    let response = app.get("/slow", &[]).await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(response.headers().contains_key(&CLACKS));
}

#[tokio::test]
async fn test_zero_write_timeout_disables_it() {
    let server = ServerConfig {
        write_timeout: Duration::ZERO,
        ..ServerConfig::default()
    };
    let app = TestApp::with_router(wrap(Router::new(), &server, &[]));

    assert_eq!(app.get(PING, &[]).await.status(), StatusCode::OK);
}

#[test]
fn test_unusable_limiter_is_an_error() {
    let limiter = LimiterConfig {
        name: "login".to_string(),
        limit: 10,
        ttl: Duration::ZERO,
    };

    let result = router::new(Router::new(), &ServerConfig::default(), &[limiter]);
    assert_eq!(
        result.err(),
        Some(RouterError::Limiter("login".to_string()))
    );
}
