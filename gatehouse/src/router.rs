//! The base router every gatehouse service starts from.

use std::fmt;
use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};

use crate::config::{LimiterConfig, ServerConfig};
use crate::filter::status_response;
use crate::logging::{RequestLogger, log_request};

/// Liveness endpoint. Not logged.
pub const PING: &str = "/ping";

/// Always a teapot.
pub const COFFEE: &str = "/coffee";

/// Header added to every response.
pub const CLACKS: HeaderName = HeaderName::from_static("x-clacks-overhead");

const CLACKS_MESSAGE: &str = "GNU Terry Pratchett, Russel Winder";

/// Error returned when the router cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The named limiter has no usable rate.
    Limiter(String),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limiter(name) if name.is_empty() => write!(f, "invalid limiter rate"),
            Self::Limiter(name) => write!(f, "invalid rate for limiter '{name}'"),
        }
    }
}

impl std::error::Error for RouterError {}

/// Build the full router around `routes`.
///
/// Adds `/ping` and `/coffee`, the server's read and write timeouts, one
/// per-client rate limit for each of `limiters`, request logging, and the
/// clacks header. The layers apply to every route in `routes`, so add
/// application routes (and any `filter::protect` layers) before calling
/// this.
///
/// Clients are told apart by `X-Forwarded-For`, `X-Real-Ip` or `Forwarded`,
/// falling back to the peer address, so serve the router with
/// `into_make_service_with_connect_info` when limiters are configured.
///
/// Layer order, outermost first:
/// - clacks header
/// - request log (so rejections are logged)
/// - limiters
/// - write timeout, then read timeout
pub fn new(
    routes: Router,
    server: &ServerConfig,
    limiters: &[LimiterConfig],
) -> Result<Router, RouterError> {
    let mut router = routes.route(PING, get(ping)).route(COFFEE, get(coffee));

    if !server.read_timeout.is_zero() {
        router = router.layer(RequestBodyTimeoutLayer::new(server.read_timeout));
    }
    if !server.write_timeout.is_zero() {
        router = router.layer(TimeoutLayer::new(server.write_timeout));
    }

    for limiter in limiters {
        let config = GovernorConfigBuilder::default()
            .period(limiter.replenish_interval())
            .burst_size(limiter.limit)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| RouterError::Limiter(limiter.name.clone()))?;
        router = router.layer(GovernorLayer {
            config: Arc::new(config),
        });
    }

    let logger = RequestLogger::new().skip(PING);
    Ok(router
        .layer(middleware::from_fn_with_state(logger, log_request))
        .layer(middleware::from_fn(gnu)))
}

async fn ping() -> &'static str {
    "pong"
}

async fn coffee() -> Response {
    status_response(StatusCode::IM_A_TEAPOT)
}

async fn gnu(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CLACKS, HeaderValue::from_static(CLACKS_MESSAGE));
    response
}
