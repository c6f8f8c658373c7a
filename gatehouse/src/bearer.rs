//! Bearer-header delivery of session tokens.
//!
//! Tokens are returned as `application/jwt` response bodies and presented by
//! clients in the `Authorization` header as `Bearer <token>`.

use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE as CONTENT_TYPE_HEADER, InvalidHeaderValue},
    },
    response::{IntoResponse, Response},
};

use crate::claims::ClaimStore;
use crate::config::SecurityConfig;
use crate::filter::{AuthOutcome, Authenticator, status_response};
use crate::logging::RecordedError;
use crate::signatory::Signatory;

/// Content type of a returned token.
pub const CONTENT_TYPE: &str = "application/jwt";

/// Header holding the token.
pub const HEADER: axum::http::HeaderName = AUTHORIZATION;

/// Scheme prefix in front of the token.
pub const PREFIX: &str = "Bearer";

/// Respond with a token signed over the named claims in `store`.
///
/// Failure to sign gives a `500 Internal Server Error`; the cause is logged
/// and attached to the response as a `RecordedError`, never sent to the
/// client.
pub fn sign(security: &SecurityConfig, store: &ClaimStore, claims: &[&str]) -> Response {
    match Signatory::from_config(security).sign(store, claims) {
        Ok(token) => (
            StatusCode::OK,
            [(CONTENT_TYPE_HEADER, HeaderValue::from_static(CONTENT_TYPE))],
            token,
        )
            .into_response(),
        Err(e) => {
            let message = format!("failed to sign bearer token: {e}");
            tracing::error!("{message}");
            let mut response = status_response(StatusCode::INTERNAL_SERVER_ERROR);
            response.extensions_mut().insert(RecordedError(message));
            response
        }
    }
}

/// Put `token` in the authorization header, adding the prefix if needed.
pub fn set_header(headers: &mut HeaderMap, token: &str) -> Result<(), InvalidHeaderValue> {
    let value = if token.starts_with(PREFIX) {
        HeaderValue::from_str(token)?
    } else {
        HeaderValue::from_str(&format!("{PREFIX} {token}"))?
    };
    headers.insert(HEADER, value);
    Ok(())
}

/// The token from the authorization header with the prefix removed.
///
/// Returns an empty string when the header is missing or unreadable.
#[must_use]
pub fn read_token(headers: &HeaderMap) -> &str {
    let value = headers
        .get(HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    value.strip_prefix(PREFIX).unwrap_or(value).trim()
}

/// Authenticates requests by the token in the authorization header.
#[derive(Debug)]
pub struct BearerAuthenticator {
    signatory: Signatory,
}

impl BearerAuthenticator {
    #[must_use]
    pub fn new(security: &SecurityConfig) -> Self {
        let signatory = Signatory::from_config(security);
        signatory.initialise();
        Self { signatory }
    }
}

impl Authenticator for BearerAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        let mut claims = ClaimStore::new();
        if self.signatory.validate(&mut claims, read_token(headers)) {
            AuthOutcome::Continue(claims)
        } else {
            AuthOutcome::Reject(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;

    use super::*;

    fn security(secret: &str) -> SecurityConfig {
        SecurityConfig {
            secret: secret.to_string(),
            session_ttl: Duration::from_secs(3_600),
            ..SecurityConfig::default()
        }
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    #[tokio::test]
    async fn test_sign_returns_token() {
        let mut store = ClaimStore::new();
        store.set("user", "alice");

        let response = sign(&security("secret"), &store, &["user"]);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE_HEADER),
            Some(&HeaderValue::from_static(CONTENT_TYPE))
        );

        let token = body(response).await;
        let mut headers = HeaderMap::new();
        set_header(&mut headers, &token).expect("valid header");

        let outcome = BearerAuthenticator::new(&security("secret")).authenticate(&headers);
        let AuthOutcome::Continue(claims) = outcome else {
            panic!("expected Continue");
        };
        assert_eq!(claims.get_as::<String>("user"), Ok(Some("alice".to_string())));
    }

    #[tokio::test]
    async fn test_sign_failure_is_server_error() {
        let security = SecurityConfig {
            session_ttl: Duration::ZERO,
            ..security("secret")
        };

        let response = sign(&security, &ClaimStore::new(), &[]);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let recorded = response
            .extensions()
            .get::<RecordedError>()
            .expect("error recorded");
        assert!(recorded.0.contains("invalid TTL"));

        assert_eq!(body(response).await, "Internal Server Error");
    }

    #[test]
    fn test_set_header_adds_prefix_once() {
        let mut headers = HeaderMap::new();

        set_header(&mut headers, "abc").expect("valid header");
        assert_eq!(headers.get(HEADER), Some(&HeaderValue::from_static("Bearer abc")));

        set_header(&mut headers, "Bearer abc").expect("valid header");
        assert_eq!(headers.get(HEADER), Some(&HeaderValue::from_static("Bearer abc")));
    }

    #[test]
    fn test_set_header_rejects_invalid_token() {
        let mut headers = HeaderMap::new();
        assert!(set_header(&mut headers, "bad\ntoken").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_read_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(read_token(&headers), "");

        headers.insert(HEADER, HeaderValue::from_static("Bearer   abc.def.ghi "));
        assert_eq!(read_token(&headers), "abc.def.ghi");

        headers.insert(HEADER, HeaderValue::from_static("abc.def.ghi"));
        assert_eq!(read_token(&headers), "abc.def.ghi");
    }

    #[test]
    fn test_authenticate_rejects() {
        let authenticator = BearerAuthenticator::new(&security("secret"));
        let unauthorized = AuthOutcome::Reject(StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        assert_eq!(authenticator.authenticate(&headers), unauthorized);

        set_header(&mut headers, "").expect("valid header");
        assert_eq!(authenticator.authenticate(&headers), unauthorized);

        let foreign = Signatory::from_config(&security("other"))
            .sign(&ClaimStore::new(), &[])
            .expect("signed token");
        set_header(&mut headers, &foreign).expect("valid header");
        assert_eq!(authenticator.authenticate(&headers), unauthorized);
    }
}
