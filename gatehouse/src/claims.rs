//! Claim values and the request-scoped claim store.
//!
//! A `ClaimStore` is the key/value state a request accumulates while it is
//! handled. Signing reads named entries out of it; successful validation
//! writes every claim of a token back into it.
//!
//! # Invariants
//! - Reading an absent key is distinct from reading a falsy value.
//! - `ClaimValue` serializes to exactly one JSON shape per variant.
//! - Non-finite floats have no JSON form and fail to serialize.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, Serializer, ser::Error as _};

/// A single claim value.
///
/// Encoded untagged, so each variant is the plain JSON value it holds.
/// Timestamps are stored as `Integer` seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Null,
    Bool(bool),
    Integer(i64),
    #[serde(serialize_with = "serialize_finite")]
    Float(f64),
    String(String),
    List(Vec<ClaimValue>),
    Map(BTreeMap<String, ClaimValue>),
}

// serde_json would write NaN and infinities as `null`.
#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        Err(S::Error::custom(format!("{value} is not a finite number")))
    }
}

impl ClaimValue {
    /// Name of the variant, used in type mismatch errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ClaimValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for ClaimValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<SystemTime> for ClaimValue {
    /// Whole seconds since the epoch. Times before the epoch are negative.
    fn from(value: SystemTime) -> Self {
        let seconds = match value.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_secs()).map_or(i64::MIN, |s| -s),
        };
        Self::Integer(seconds)
    }
}

impl<T: Into<Self>> From<Vec<T>> for ClaimValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Error returned when a claim holds a different type than requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTypeError {
    /// The type the caller asked for.
    pub expected: &'static str,
    /// The type actually stored.
    pub found: &'static str,
}

impl std::fmt::Display for ClaimTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {} claim, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ClaimTypeError {}

impl TryFrom<&ClaimValue> for String {
    type Error = ClaimTypeError;

    fn try_from(value: &ClaimValue) -> Result<Self, Self::Error> {
        match value {
            ClaimValue::String(s) => Ok(s.to_owned()),
            other => Err(ClaimTypeError {
                expected: "string",
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<&ClaimValue> for i64 {
    type Error = ClaimTypeError;

    fn try_from(value: &ClaimValue) -> Result<Self, Self::Error> {
        match value {
            ClaimValue::Integer(n) => Ok(*n),
            other => Err(ClaimTypeError {
                expected: "integer",
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<&ClaimValue> for f64 {
    type Error = ClaimTypeError;

    /// Integers widen to floats; JSON does not keep the distinction.
    #[allow(clippy::cast_precision_loss)]
    fn try_from(value: &ClaimValue) -> Result<Self, Self::Error> {
        match value {
            ClaimValue::Float(n) => Ok(*n),
            ClaimValue::Integer(n) => Ok(*n as Self),
            other => Err(ClaimTypeError {
                expected: "float",
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<&ClaimValue> for bool {
    type Error = ClaimTypeError;

    fn try_from(value: &ClaimValue) -> Result<Self, Self::Error> {
        match value {
            ClaimValue::Bool(b) => Ok(*b),
            other => Err(ClaimTypeError {
                expected: "bool",
                found: other.kind(),
            }),
        }
    }
}

/// Request-scoped claim storage.
///
/// Handlers populate it before signing, and authenticators hand a populated
/// store to downstream handlers as a request extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimStore {
    entries: BTreeMap<String, ClaimValue>,
}

impl ClaimStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored under `key`, or `None` if the key is absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ClaimValue> {
        self.entries.get(key)
    }

    /// Get the value stored under `key` as a concrete type.
    ///
    /// Returns `Ok(None)` when the key is absent and an error when the key
    /// holds a value of another type.
    pub fn get_as<'a, T>(&'a self, key: &str) -> Result<Option<T>, ClaimTypeError>
    where
        T: TryFrom<&'a ClaimValue, Error = ClaimTypeError>,
    {
        self.entries.get(key).map(T::try_from).transpose()
    }

    /// Set `key` to `value`, replacing any existing value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ClaimValue>) {
        self.entries.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ClaimValue> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Extend<(String, ClaimValue)> for ClaimStore {
    fn extend<I: IntoIterator<Item = (String, ClaimValue)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl FromIterator<(String, ClaimValue)> for ClaimStore {
    fn from_iter<I: IntoIterator<Item = (String, ClaimValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
