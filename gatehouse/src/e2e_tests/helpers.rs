//! Common helpers for end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Router,
    body::{Body, to_bytes},
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower::ServiceExt;

use crate::bearer::{self, BearerAuthenticator};
use crate::claims::ClaimStore;
use crate::config::{LimiterConfig, SecurityConfig, ServerConfig};
use crate::cookie::{self, CookieAuthenticator};
use crate::filter::protect;
use crate::router;
use crate::timebox::timebox;

/// Login timebox used by the test app.
pub const LOGIN_TIMEBOX: Duration = Duration::from_millis(150);

/// Security settings with a fixed secret.
#[must_use]
pub fn security() -> SecurityConfig {
    SecurityConfig {
        secret: "e2e-secret".to_string(),
        domain: String::new(),
        session_ttl: Duration::from_secs(3_600),
        login_timebox: LOGIN_TIMEBOX,
    }
}

#[derive(Debug, Deserialize)]
struct Login {
    user: String,
    #[serde(default)]
    password: String,
}

/// The only account the test app knows.
fn check_credentials(user: &str, password: &str) -> bool {
    user == "alice" && password == "wonderland"
}

async fn login(
    State(security): State<Arc<SecurityConfig>>,
    Query(login): Query<Login>,
) -> Response {
    let deadline = timebox(security.login_timebox);

    let mut headers = HeaderMap::new();
    let status = if check_credentials(&login.user, &login.password) {
        let mut store = ClaimStore::new();
        store.set("user", login.user);
        store.set("role", "reader");
        match cookie::drop_cookie(&mut headers, &security, &store, &["user", "role"]) {
            Ok(()) => StatusCode::NO_CONTENT,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    } else {
        StatusCode::UNAUTHORIZED
    };

    deadline.wait().await;
    (status, headers).into_response()
}

async fn logout(State(security): State<Arc<SecurityConfig>>) -> Response {
    let mut headers = HeaderMap::new();
    match cookie::clear(&mut headers, &security) {
        Ok(()) => (StatusCode::NO_CONTENT, headers).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn token(
    State(security): State<Arc<SecurityConfig>>,
    Query(login): Query<Login>,
) -> Response {
    let mut store = ClaimStore::new();
    store.set("user", login.user);
    bearer::sign(&security, &store, &["user"])
}

async fn whoami(Extension(claims): Extension<ClaimStore>) -> String {
    claims
        .get_as::<String>("user")
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Build the test application.
///
/// - `/login`, `/logout`, `/token`: public
/// - `/whoami`: cookie session, 401 on failure
/// - `/account`: cookie session, redirect to `/login` on failure
/// - `/api/whoami`: bearer token, 401 on failure
#[must_use]
pub fn app(security: &SecurityConfig) -> Router {
    let public = Router::new()
        .route("/login", get(login))
        .route("/logout", get(logout))
        .route("/token", get(token))
        .with_state(Arc::new(security.clone()));

    let session = protect(
        Router::new().route("/whoami", get(whoami)),
        CookieAuthenticator::new(security, None),
    );
    let account = protect(
        Router::new().route("/account", get(whoami)),
        CookieAuthenticator::new(security, Some("/login".to_string())),
    );
    let api = protect(
        Router::new().route("/api/whoami", get(whoami)),
        BearerAuthenticator::new(security),
    );

    wrap(public.merge(session).merge(account).merge(api), &ServerConfig::default(), &[])
}

/// Wrap `routes` in the base router.
#[must_use]
pub fn wrap(routes: Router, server: &ServerConfig, limiters: &[LimiterConfig]) -> Router {
    #[allow(clippy::expect_used)]
    router::new(routes, server, limiters).expect("valid router")
}

/// A test application that can be sent requests.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_security(&security())
    }

    #[must_use]
    pub fn with_security(security: &SecurityConfig) -> Self {
        Self::with_router(app(security))
    }

    #[must_use]
    pub const fn with_router(router: Router) -> Self {
        Self { router }
    }

    /// Send a GET request with the given headers.
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response {
        let mut request = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        #[allow(clippy::expect_used)]
        let request = request.body(Body::empty()).expect("valid request");

        #[allow(clippy::expect_used)]
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

/// Read a response body as a string.
pub async fn body_string(response: Response) -> String {
    #[allow(clippy::expect_used)]
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8_lossy(&bytes).into_owned()
}

/// All `Set-Cookie` headers of a response.
#[must_use]
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_owned)
        .collect()
}

/// The `name=value` pair of the session cookie, ready for a `Cookie` header.
#[must_use]
pub fn session_cookie(response: &Response) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&format!("{}=", cookie::NAME)))
        .and_then(|c| c.split(';').next().map(str::to_owned))
}
