//! Request logging middleware.
//!
//! Logs one event per request with the status, method, path and latency,
//! plus forwarding headers, referer and client address when present. The
//! level follows the status: server errors log at `error`, client errors at
//! `warn`, everything else at `info` unless a handler recorded an error.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header::REFERER},
    middleware::Next,
    response::Response,
};

/// An error a handler hit while producing its response.
///
/// Handlers attach it to the response extensions so the request log carries
/// the detail while the client only sees a generic status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError(pub String);

/// Configuration for `log_request`.
#[derive(Debug, Clone, Default)]
pub struct RequestLogger {
    skip: Arc<HashSet<String>>,
}

impl RequestLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not log requests for `path`.
    #[must_use]
    pub fn skip(self, path: impl Into<String>) -> Self {
        let mut skip = (*self.skip).clone();
        skip.insert(path.into());
        Self {
            skip: Arc::new(skip),
        }
    }

    #[must_use]
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip.contains(path)
    }
}

/// Header values copied into the log event when present.
#[derive(Debug, Default)]
struct Forwarded {
    forwarded_for: Option<String>,
    forwarded_proto: Option<String>,
    forwarded_port: Option<String>,
    referer: Option<String>,
}

impl Forwarded {
    fn capture(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        Self {
            forwarded_for: get("x-forwarded-for"),
            forwarded_proto: get("x-forwarded-proto"),
            forwarded_port: get("x-forwarded-port"),
            referer: get(REFERER.as_str()),
        }
    }
}

/// Round a latency to milliseconds once it exceeds a second.
#[must_use]
pub fn round_latency(latency: Duration) -> Duration {
    if latency < Duration::from_secs(1) {
        return latency;
    }
    let millis = latency.saturating_add(Duration::from_micros(500)).as_millis();
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

/// Middleware that logs each request once its response is ready.
pub async fn log_request(
    State(logger): State<RequestLogger>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if logger.is_skipped(&path) {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let forwarded = Forwarded::capture(request.headers());
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = round_latency(start.elapsed());

    let status = response.status();
    let error = response
        .extensions()
        .get::<RecordedError>()
        .map(|RecordedError(e)| e.as_str());

    macro_rules! request_event {
        ($level:expr, $message:literal) => {
            tracing::event!(
                $level,
                status = status.as_u16(),
                method = %method,
                path = %path,
                ?latency,
                forwarded_for = forwarded.forwarded_for.as_deref(),
                forwarded_proto = forwarded.forwarded_proto.as_deref(),
                forwarded_port = forwarded.forwarded_port.as_deref(),
                referer = forwarded.referer.as_deref(),
                client_ip = client_ip.map(tracing::field::display),
                errors = error,
                $message
            )
        };
    }

    if status.is_server_error() {
        request_event!(tracing::Level::ERROR, "failed to handle request");
    } else if status.is_client_error() {
        request_event!(tracing::Level::WARN, "problem handling request");
    } else if error.is_some() {
        request_event!(tracing::Level::ERROR, "errors handling request");
    } else {
        request_event!(tracing::Level::INFO, "handled request");
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_round_latency() {
        assert_eq!(
            round_latency(Duration::from_micros(1_234)),
            Duration::from_micros(1_234)
        );
        assert_eq!(
            round_latency(Duration::from_micros(1_234_567)),
            Duration::from_millis(1_235)
        );
        assert_eq!(
            round_latency(Duration::from_micros(2_000_400)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_skip() {
        let logger = RequestLogger::new().skip("/ping");
        assert!(logger.is_skipped("/ping"));
        assert!(!logger.is_skipped("/coffee"));

        let extended = logger.clone().skip("/health");
        assert!(extended.is_skipped("/ping"));
        assert!(extended.is_skipped("/health"));
        assert!(!logger.is_skipped("/health"));
    }

    #[test]
    fn test_forwarded_capture() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        headers.insert("x-forwarded-port", HeaderValue::from_static(""));
        headers.insert(REFERER, HeaderValue::from_static("https://example.com/"));

        let forwarded = Forwarded::capture(&headers);
        assert_eq!(forwarded.forwarded_for.as_deref(), Some("10.0.0.1"));
        assert_eq!(forwarded.forwarded_proto, None);
        assert_eq!(forwarded.forwarded_port, None);
        assert_eq!(forwarded.referer.as_deref(), Some("https://example.com/"));
    }
}
