//! Cookie delivery of session tokens.
//!
//! The dropped cookie carries a signed token and a `Max-Age` matching the
//! session TTL. The `Max-Age` only lets the browser tidy up old cookies; the
//! client controls it, so authentication relies on the signed `exp` claim
//! alone.

use std::fmt;
use std::time::Duration;

use axum::http::{
    HeaderMap, HeaderValue, StatusCode,
    header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
};

use crate::claims::ClaimStore;
use crate::config::SecurityConfig;
use crate::filter::{AuthOutcome, Authenticator};
use crate::signatory::{SignError, Signatory};

/// Name of the dropped cookie.
pub const NAME: &str = "GatehouseAuth";

/// Error returned when a cookie cannot be dropped.
#[derive(Debug)]
pub enum CookieError {
    /// The token could not be signed, or the TTL is unusable.
    Sign(SignError),
    /// The cookie does not form a valid header value.
    Header(InvalidHeaderValue),
}

impl fmt::Display for CookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sign(e) => write!(f, "failed to drop authorisation cookie: {e}"),
            Self::Header(e) => write!(f, "invalid authorisation cookie: {e}"),
        }
    }
}

impl std::error::Error for CookieError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sign(e) => Some(e),
            Self::Header(e) => Some(e),
        }
    }
}

impl From<SignError> for CookieError {
    fn from(e: SignError) -> Self {
        Self::Sign(e)
    }
}

impl From<InvalidHeaderValue> for CookieError {
    fn from(e: InvalidHeaderValue) -> Self {
        Self::Header(e)
    }
}

/// Drop a cookie holding a token signed over the named claims in `store`.
///
/// Appends one `Set-Cookie` header to `headers`, or nothing on error.
///
/// # Errors
///
/// Returns `SignError::InvalidTtl` (wrapped) when the session TTL, or the
/// TTL rounded to whole seconds, is zero.
pub fn drop_cookie(
    headers: &mut HeaderMap,
    security: &SecurityConfig,
    store: &ClaimStore,
    claims: &[&str],
) -> Result<(), CookieError> {
    let ttl = security.session_ttl;
    let max_age = round_to_seconds(ttl);
    if ttl.is_zero() || max_age == 0 {
        return Err(SignError::InvalidTtl(ttl).into());
    }

    let token = Signatory::from_config(security).sign(store, claims)?;
    let cookie = format_cookie(&token, &max_age.to_string(), security)?;
    headers.append(SET_COOKIE, cookie);

    Ok(())
}

/// Overwrite the cookie with an already expired one, ending the session on
/// the client.
pub fn clear(headers: &mut HeaderMap, security: &SecurityConfig) -> Result<(), CookieError> {
    let cookie = format_cookie("", "-1", security)?;
    headers.append(SET_COOKIE, cookie);
    Ok(())
}

/// Find the session token among the request's cookies.
#[must_use]
pub fn read_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == NAME).then_some(value.trim())
        })
}

fn format_cookie(
    value: &str,
    max_age: &str,
    security: &SecurityConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{NAME}={value}; Path=/; Max-Age={max_age}; HttpOnly; Secure; SameSite=Lax");
    if security.secure() {
        cookie.push_str("; Domain=");
        cookie.push_str(&security.domain);
    }
    HeaderValue::from_str(&cookie)
}

/// Round half up to whole seconds.
fn round_to_seconds(ttl: Duration) -> u64 {
    ttl.saturating_add(Duration::from_millis(500)).as_secs()
}

/// Authenticates requests by the token in the session cookie.
#[derive(Debug)]
pub struct CookieAuthenticator {
    signatory: Signatory,
    redirect: Option<String>,
}

impl CookieAuthenticator {
    /// Reject unauthenticated requests with a redirect to `redirect`, or with
    /// `401 Unauthorized` when there is none.
    #[must_use]
    pub fn new(security: &SecurityConfig, redirect: Option<String>) -> Self {
        let signatory = Signatory::from_config(security);
        signatory.initialise();

        Self {
            signatory,
            redirect: redirect.filter(|url| !url.is_empty()),
        }
    }
}

impl Authenticator for CookieAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> AuthOutcome {
        let mut claims = ClaimStore::new();
        let authorised =
            read_token(headers).is_some_and(|token| self.signatory.validate(&mut claims, token));

        match (&self.redirect, authorised) {
            (_, true) => AuthOutcome::Continue(claims),
            (Some(url), false) => AuthOutcome::Redirect(url.to_owned()),
            (None, false) => AuthOutcome::Reject(StatusCode::UNAUTHORIZED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> SecurityConfig {
        SecurityConfig {
            secret: "secret".to_string(),
            session_ttl: Duration::from_secs(3_600),
            ..SecurityConfig::default()
        }
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().expect("ascii cookie").to_string())
            .collect()
    }

    fn cookie_request(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(value).expect("valid cookie"));
        headers
    }

    #[test]
    fn test_drop_writes_one_valid_cookie() {
        let mut store = ClaimStore::new();
        store.set("user", "alice");
        let mut headers = HeaderMap::new();

        drop_cookie(&mut headers, &security(), &store, &["user", "realm"]).expect("dropped");

        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("GatehouseAuth="));
        assert!(cookies[0].contains("Max-Age=3600"));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[0].contains("Secure"));
        assert!(!cookies[0].contains("Domain="));

        let outcome = CookieAuthenticator::new(&security(), None)
            .authenticate(&cookie_request(cookies[0].split(';').next().expect("pair")));
        let AuthOutcome::Continue(claims) = outcome else {
            panic!("expected Continue");
        };
        assert_eq!(claims.get_as::<String>("user"), Ok(Some("alice".to_string())));
    }

    #[test]
    fn test_drop_with_random_secret() {
        let security = SecurityConfig {
            secret: String::new(),
            ..security()
        };
        let mut headers = HeaderMap::new();

        drop_cookie(&mut headers, &security, &ClaimStore::new(), &[]).expect("dropped");

        assert_eq!(set_cookies(&headers).len(), 1);
    }

    #[test]
    fn test_zero_ttl_errors() {
        let security = SecurityConfig {
            session_ttl: Duration::ZERO,
            ..security()
        };
        let mut headers = HeaderMap::new();

        let result = drop_cookie(&mut headers, &security, &ClaimStore::new(), &[]);

        assert!(matches!(
            result,
            Err(CookieError::Sign(SignError::InvalidTtl(_)))
        ));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_sub_second_ttl_errors() {
        let security = SecurityConfig {
            session_ttl: Duration::from_millis(499),
            ..security()
        };
        let mut headers = HeaderMap::new();

        let result = drop_cookie(&mut headers, &security, &ClaimStore::new(), &[]);

        assert!(matches!(
            result,
            Err(CookieError::Sign(SignError::InvalidTtl(ttl))) if ttl == Duration::from_millis(499)
        ));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_max_age_rounds_half_up() {
        assert_eq!(round_to_seconds(Duration::from_millis(499)), 0);
        assert_eq!(round_to_seconds(Duration::from_millis(500)), 1);
        assert_eq!(round_to_seconds(Duration::from_millis(1_499)), 1);
        assert_eq!(round_to_seconds(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_domain_added_when_secure() {
        let security = SecurityConfig {
            domain: "example.com".to_string(),
            ..security()
        };
        let mut headers = HeaderMap::new();

        drop_cookie(&mut headers, &security, &ClaimStore::new(), &[]).expect("dropped");

        assert!(set_cookies(&headers)[0].ends_with("; Domain=example.com"));
    }

    #[test]
    fn test_invalid_domain_errors() {
        let security = SecurityConfig {
            domain: "bad\ndomain".to_string(),
            ..security()
        };
        let mut headers = HeaderMap::new();

        let result = drop_cookie(&mut headers, &security, &ClaimStore::new(), &[]);

        assert!(matches!(result, Err(CookieError::Header(_))));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_clear_expires_cookie() {
        let mut headers = HeaderMap::new();
        clear(&mut headers, &security()).expect("cleared");

        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("GatehouseAuth=;"));
        assert!(cookies[0].contains("Max-Age=-1"));
    }

    #[test]
    fn test_read_token() {
        let headers = cookie_request("theme=dark; GatehouseAuth=abc.def.ghi ; other=1");
        assert_eq!(read_token(&headers), Some("abc.def.ghi"));

        assert_eq!(read_token(&cookie_request("theme=dark")), None);
        assert_eq!(read_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_invalid_cookie_rejected() {
        let outcome = CookieAuthenticator::new(&security(), None)
            .authenticate(&cookie_request("GatehouseAuth=garbage"));
        assert_eq!(outcome, AuthOutcome::Reject(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_missing_cookie_redirects_when_configured() {
        let authenticator = CookieAuthenticator::new(&security(), Some("/login".to_string()));
        assert_eq!(
            authenticator.authenticate(&HeaderMap::new()),
            AuthOutcome::Redirect("/login".to_string())
        );

        let authenticator = CookieAuthenticator::new(&security(), Some(String::new()));
        assert_eq!(
            authenticator.authenticate(&HeaderMap::new()),
            AuthOutcome::Reject(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn test_cookie_error_display() {
        let error = CookieError::from(SignError::InvalidTtl(Duration::ZERO));
        assert_eq!(
            error.to_string(),
            "failed to drop authorisation cookie: invalid TTL: 0ns"
        );
    }
}
