//! Token signing and validation.
//!
//! A `Signatory` turns named claims from a `ClaimStore` into a signed JWT and
//! turns a JWT back into claims.
//!
//! # Pre-conditions
//! - Signing requires a strictly positive TTL.
//!
//! # Post-conditions
//! - Every signed token carries an `exp` claim of `floor(now + ttl)` seconds.
//! - Validation reports only a boolean; the reason a token was rejected is
//!   never returned to the caller.
//!
//! # Invariants
//! - A signatory without an explicit secret uses its fallback secret, which is
//!   generated once and shared by every signatory holding the same
//!   `FallbackSecret`. By default that is the process-wide instance.
//! - The secret of a signatory never changes after it is first resolved.

use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64ct::{Base64, Encoding};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::claims::{ClaimStore, ClaimValue};
use crate::config::SecurityConfig;

/// Reserved claim holding the absolute expiry in seconds since the epoch.
pub const EXPIRY_CLAIM: &str = "exp";

/// Length in bytes of a generated secret, before encoding.
pub const SECRET_LENGTH: usize = 64;

/// Algorithm used when none is configured.
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::HS512;

/// Algorithms accepted during validation. They all share the HMAC secret.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Error returned when signing fails.
#[derive(Debug)]
pub enum SignError {
    /// The TTL is zero, or too large to express as an expiry instant.
    InvalidTtl(Duration),
    /// The signing primitive rejected the operation.
    SigningFailure(jsonwebtoken::errors::Error),
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTtl(ttl) => write!(f, "invalid TTL: {ttl:?}"),
            Self::SigningFailure(e) => write!(f, "failed to sign JWT: {e}"),
        }
    }
}

impl std::error::Error for SignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidTtl(_) => None,
            Self::SigningFailure(e) => Some(e),
        }
    }
}

/// Generate a new secret from `rng`.
///
/// Reads `SECRET_LENGTH` bytes and returns them base64 encoded. For real
/// secrets `rng` must be cryptographically secure, such as `OsRng`.
pub fn generate_secret<R: TryRngCore + ?Sized>(rng: &mut R) -> Result<String, R::Error> {
    let mut secret = [0u8; SECRET_LENGTH];
    rng.try_fill_bytes(&mut secret)?;
    Ok(Base64::encode_string(&secret))
}

/// A lazily generated secret shared by signatories that have none of their
/// own.
///
/// # Thread Safety
///
/// Generation happens inside `OnceLock::get_or_init`, so concurrent first use
/// still produces a single secret.
pub struct FallbackSecret {
    secret: OnceLock<String>,
}

static PROCESS_FALLBACK: LazyLock<Arc<FallbackSecret>> =
    LazyLock::new(|| Arc::new(FallbackSecret::new()));

impl FallbackSecret {
    /// Create a holder with no secret generated yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            secret: OnceLock::new(),
        }
    }

    /// The process-wide fallback used by default.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected
    pub fn process() -> Arc<Self> {
        Arc::clone(&PROCESS_FALLBACK)
    }

    /// Get the secret, generating it on first use.
    ///
    /// # Panics
    ///
    /// Panics if the operating system's random source fails. There is no
    /// sensible way to continue without one.
    pub fn get(&self) -> &str {
        self.secret.get_or_init(|| {
            #[allow(clippy::expect_used)]
            let secret = generate_secret(&mut OsRng).expect("OS random source failed");
            tracing::debug!("generated fallback signing secret");
            secret
        })
    }

    /// Whether the secret has been generated yet.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.secret.get().is_some()
    }
}

impl Default for FallbackSecret {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FallbackSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackSecret")
            .field("generated", &self.is_generated())
            .finish()
    }
}

/// Signs and validates session tokens.
pub struct Signatory {
    /// Explicit secret, or the fallback once resolved.
    secret: OnceLock<String>,
    ttl: Duration,
    algorithm: Algorithm,
    fallback: Arc<FallbackSecret>,
}

impl Signatory {
    /// Create a signatory with the given TTL, the default algorithm and the
    /// process-wide fallback secret.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            secret: OnceLock::new(),
            ttl,
            algorithm: DEFAULT_ALGORITHM,
            fallback: FallbackSecret::process(),
        }
    }

    /// Create a signatory from the security settings.
    #[must_use]
    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(security.session_ttl).with_secret(security.secret.as_str())
    }

    /// Use an explicit secret. An empty secret leaves the signatory on its
    /// fallback.
    #[must_use]
    pub fn with_secret(self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if secret.is_empty() {
            return self;
        }
        Self {
            secret: OnceLock::from(secret),
            ..self
        }
    }

    #[must_use]
    pub fn with_algorithm(self, algorithm: Algorithm) -> Self {
        Self { algorithm, ..self }
    }

    /// Share `fallback` instead of the process-wide fallback.
    #[must_use]
    pub fn with_fallback(self, fallback: Arc<FallbackSecret>) -> Self {
        Self { fallback, ..self }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Resolve the secret, adopting the fallback if none was given.
    ///
    /// Idempotent. `sign` and `validate` call this themselves.
    pub fn initialise(&self) {
        let _ = self.secret();
    }

    fn secret(&self) -> &str {
        self.secret.get_or_init(|| self.fallback.get().to_owned())
    }

    /// Sign the named claims from `store` into a token.
    ///
    /// Names that are absent from the store are skipped. The `exp` claim is
    /// always set from the TTL, replacing any value in the store.
    ///
    /// # Errors
    ///
    /// Returns `SignError::InvalidTtl` for a zero TTL and
    /// `SignError::SigningFailure` if the algorithm rejects the HMAC key or a
    /// claim has no JSON form (a NaN or infinite float).
    pub fn sign(&self, store: &ClaimStore, claims: &[&str]) -> Result<String, SignError> {
        if self.ttl.is_zero() {
            return Err(SignError::InvalidTtl(self.ttl));
        }
        let expiry = expiry_seconds(self.ttl).ok_or(SignError::InvalidTtl(self.ttl))?;

        let mut payload: ClaimStore = claims
            .iter()
            .filter_map(|&name| store.get(name).map(|v| (name.to_owned(), v.clone())))
            .collect();
        payload.set(EXPIRY_CLAIM, ClaimValue::Integer(expiry));

        let key = EncodingKey::from_secret(self.secret().as_bytes());
        encode(&Header::new(self.algorithm), &payload, &key).map_err(SignError::SigningFailure)
    }

    /// Validate `token`, copying its claims into `store` if it is valid.
    ///
    /// Returns false for malformed, forged and expired tokens alike. `store` is
    /// left untouched unless the token is valid.
    pub fn validate(&self, store: &mut ClaimStore, token: &str) -> bool {
        let key = DecodingKey::from_secret(self.secret().as_bytes());

        let mut validation = Validation::new(self.algorithm);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&[EXPIRY_CLAIM]);

        match decode::<ClaimStore>(token, &key, &validation) {
            Ok(data) => {
                store.extend(
                    data.claims
                        .iter()
                        .map(|(name, value)| (name.to_owned(), value.clone())),
                );
                true
            }
            Err(e) => {
                tracing::debug!("rejected token: {e}");
                false
            }
        }
    }
}

impl fmt::Debug for Signatory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signatory")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Seconds since the epoch at `now + ttl`, or `None` on overflow.
fn expiry_seconds(ttl: Duration) -> Option<i64> {
    let at = SystemTime::now().checked_add(ttl)?;
    let since_epoch = at.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_secs()).ok()
}
