//! Request filters for authenticated routes.
//!
//! An `Authenticator` inspects request headers and returns an `AuthOutcome`.
//! `protect` installs one in front of a router, so handlers only run for
//! requests that carry a valid token and can read its claims with
//! `Extension<ClaimStore>`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};

use crate::claims::ClaimStore;

/// What to do with a request after authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Authenticated; pass the claims on to the handler.
    Continue(ClaimStore),
    /// Stop and respond with this status.
    Reject(StatusCode),
    /// Stop and send the client to this URL with a temporary redirect.
    Redirect(String),
}

impl AuthOutcome {
    /// The response for a stopped request, or `None` for `Continue`.
    #[must_use]
    pub fn rejection(&self) -> Option<Response> {
        match self {
            Self::Continue(_) => None,
            Self::Reject(status) => Some(status_response(*status)),
            Self::Redirect(url) => Some(Redirect::temporary(url).into_response()),
        }
    }
}

/// Decides whether a request may proceed.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome;
}

/// Require `authenticator` to pass for every route currently in `router`.
///
/// Routes added after this call are not protected.
pub fn protect<S, A>(router: Router<S>, authenticator: A) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    A: Authenticator,
{
    router.route_layer(middleware::from_fn_with_state(
        Arc::new(authenticator),
        run_filter::<A>,
    ))
}

async fn run_filter<A: Authenticator>(
    State(authenticator): State<Arc<A>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticator.authenticate(request.headers()) {
        AuthOutcome::Continue(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        outcome => {
            tracing::debug!(path = %request.uri().path(), "request not authenticated");
            outcome
                .rejection()
                .unwrap_or_else(|| status_response(StatusCode::UNAUTHORIZED))
        }
    }
}

/// A plain-text response carrying the status's canonical reason.
pub(crate) fn status_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or_default();
    (status, reason).into_response()
}
