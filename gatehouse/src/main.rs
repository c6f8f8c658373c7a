#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code; a bad token or header must never panic.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;

use axum::{Extension, Json, Router, routing::get};
use gatehouse::{
    ClaimStore,
    bearer::BearerAuthenticator,
    config::{LimiterConfig, SecurityConfig, ServerConfig},
    protect, router,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let server = ServerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("Failed to load server configuration: {e}");
        std::process::exit(1);
    });
    let security = SecurityConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("Failed to load security configuration: {e}");
        std::process::exit(1);
    });
    let limiter = LimiterConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("Failed to load limiter configuration: {e}");
        std::process::exit(1);
    });

    tracing::info!(
        "Loaded configuration: listen_port={}, development={}, read_timeout={:?}, write_timeout={:?}, limit={} per {:?}, {security}",
        server.listen_port,
        server.development,
        server.read_timeout,
        server.write_timeout,
        limiter.limit,
        limiter.ttl
    );

    // Tokens are issued by other services sharing the secret; this one only
    // verifies them, so a random secret would reject every token.
    if let Err(e) = security.require_secret() {
        tracing::error!("{e}");
        std::process::exit(1);
    }

    let protected = Router::new().route("/whoami", get(whoami));
    let app = router::new(
        protect(protected, BearerAuthenticator::new(&security)),
        &server,
        &[limiter],
    )
    .unwrap_or_else(|e| {
        tracing::error!("Failed to build router: {e}");
        std::process::exit(1);
    });

    let addr = server.bind_address();
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}

/// Echo the claims of the presented token.
async fn whoami(Extension(claims): Extension<ClaimStore>) -> Json<ClaimStore> {
    Json(claims)
}
