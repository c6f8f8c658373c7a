//! Server and security configuration.
//!
//! This module provides configuration loading for the gatehouse server from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `GATEHOUSE_LISTEN_PORT`: Port to listen on (default: `8000`)
//! - `GATEHOUSE_DEVELOPMENT`: Bind to localhost only (default: `false`)
//! - `GATEHOUSE_READ_TIMEOUT`: Time allowed to read a request body (default: `60s`)
//! - `GATEHOUSE_WRITE_TIMEOUT`: Time allowed to produce a response (default: `60s`)
//! - `GATEHOUSE_SECRET`: Token signing secret (default: empty, meaning random)
//! - `GATEHOUSE_DOMAIN`: Cookie domain (default: empty)
//! - `GATEHOUSE_SESSION_TTL`: Session lifetime (default: `12h`)
//! - `GATEHOUSE_LOGIN_TIMEBOX`: Minimum login latency (default: `500ms`)
//! - `GATEHOUSE_LIMITER_LIMIT`: Requests per client per limiter TTL (default: `100`)
//! - `GATEHOUSE_LIMITER_TTL`: Limiter window (default: `1s`)
//!
//! Named limiters read `GATEHOUSE_<NAME>_LIMITER_LIMIT` and
//! `GATEHOUSE_<NAME>_LIMITER_TTL` instead.
//!
//! Durations use the `1h30m` / `500ms` / `1.5s` notation.
//!
//! # Invariants
//!
//! - `listen_port` is always a valid port number
//! - Durations are never negative; a zero session TTL is accepted here and
//!   rejected when a token is signed
//! - A zero read or write timeout disables that timeout
//! - A limiter always admits at least one request per window

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on.
    pub listen_port: u16,
    /// Development mode binds to the loopback interface only.
    pub development: bool,
    /// Time allowed to read a request body. Zero disables the timeout.
    pub read_timeout: Duration,
    /// Time allowed to produce a response. Zero disables the timeout.
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 8000;
    /// Default read and write timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_port = match lookup("GATEHOUSE_LISTEN_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "GATEHOUSE_LISTEN_PORT".to_string(),
                message: format!("'{value}' is not a valid port number (must be 0-65535)"),
            })?,
            None => Self::DEFAULT_PORT,
        };
        let development = match lookup("GATEHOUSE_DEVELOPMENT") {
            Some(value) => parse_bool("GATEHOUSE_DEVELOPMENT", &value)?,
            None => false,
        };
        let read_timeout = match lookup("GATEHOUSE_READ_TIMEOUT") {
            Some(value) => parse_duration_var("GATEHOUSE_READ_TIMEOUT", &value)?,
            None => Self::DEFAULT_TIMEOUT,
        };
        let write_timeout = match lookup("GATEHOUSE_WRITE_TIMEOUT") {
            Some(value) => parse_duration_var("GATEHOUSE_WRITE_TIMEOUT", &value)?,
            None => Self::DEFAULT_TIMEOUT,
        };

        Ok(Self {
            listen_port,
            development,
            read_timeout,
            write_timeout,
        })
    }

    /// Address to bind the listener to.
    #[must_use]
    pub const fn bind_address(&self) -> SocketAddr {
        let ip = if self.development {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        SocketAddr::new(ip, self.listen_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: Self::DEFAULT_PORT,
            development: false,
            read_timeout: Self::DEFAULT_TIMEOUT,
            write_timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Per-client request rate limit.
///
/// A client may make `limit` requests per `ttl`. Spent allowance is
/// replenished one request at a time, every `ttl / limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Namespaces the environment variables when more than one limiter is
    /// configured. Empty for the default limiter.
    pub name: String,
    /// Requests allowed per window. Never zero.
    pub limit: u32,
    /// Length of the window.
    pub ttl: Duration,
}

impl LimiterConfig {
    /// Default requests per window.
    pub const DEFAULT_LIMIT: u32 = 100;
    /// Default window.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

    /// Load the unnamed limiter from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup("", |name| std::env::var(name).ok())
    }

    /// Load the limiter called `name` through `lookup`.
    ///
    /// Post-conditions:
    /// - `limit` is at least 1
    /// - `replenish_interval()` is non-zero
    pub fn from_lookup(
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let prefix = if name.is_empty() {
            "GATEHOUSE_".to_string()
        } else {
            format!("GATEHOUSE_{}_", name.to_ascii_uppercase())
        };
        let limit_var = format!("{prefix}LIMITER_LIMIT");
        let ttl_var = format!("{prefix}LIMITER_TTL");

        let limit = match lookup(&limit_var) {
            Some(value) => match value.parse::<u32>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: limit_var,
                        message: format!("'{value}' is not a positive request count"),
                    });
                }
            },
            None => Self::DEFAULT_LIMIT,
        };
        let ttl = match lookup(&ttl_var) {
            Some(value) => parse_duration_var(&ttl_var, &value)?,
            None => Self::DEFAULT_TTL,
        };

        let config = Self {
            name: name.to_string(),
            limit,
            ttl,
        };
        if config.replenish_interval().is_zero() {
            return Err(ConfigError::InvalidValue {
                name: ttl_var,
                message: format!("{ttl:?} is too short for {limit} requests"),
            });
        }
        Ok(config)
    }

    /// Time taken to earn back one spent request.
    #[must_use]
    pub fn replenish_interval(&self) -> Duration {
        self.ttl / self.limit.max(1)
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            limit: Self::DEFAULT_LIMIT,
            ttl: Self::DEFAULT_TTL,
        }
    }
}

/// Security settings shared by the signatory and the delivery adapters.
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Secret used to sign tokens. Empty means a random per-process secret.
    pub secret: String,
    /// Domain the service runs on. Used as the cookie domain when secure.
    pub domain: String,
    /// How long a session is valid before re-authentication is required.
    pub session_ttl: Duration,
    /// Minimum time a login attempt takes to return.
    pub login_timebox: Duration,
}

impl SecurityConfig {
    /// Default session lifetime.
    pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);
    /// Default login timebox.
    pub const DEFAULT_LOGIN_TIMEBOX: Duration = Duration::from_millis(500);

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let session_ttl = match lookup("GATEHOUSE_SESSION_TTL") {
            Some(value) => parse_duration_var("GATEHOUSE_SESSION_TTL", &value)?,
            None => Self::DEFAULT_SESSION_TTL,
        };
        let login_timebox = match lookup("GATEHOUSE_LOGIN_TIMEBOX") {
            Some(value) => parse_duration_var("GATEHOUSE_LOGIN_TIMEBOX", &value)?,
            None => Self::DEFAULT_LOGIN_TIMEBOX,
        };

        Ok(Self {
            secret: lookup("GATEHOUSE_SECRET").unwrap_or_default(),
            domain: lookup("GATEHOUSE_DOMAIN").unwrap_or_default(),
            session_ttl,
            login_timebox,
        })
    }

    /// Fails unless an explicit secret is configured.
    ///
    /// Services that only verify tokens issued elsewhere need this: a random
    /// per-process secret would reject every token.
    pub fn require_secret(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "GATEHOUSE_SECRET".to_string(),
                message: "must be set".to_string(),
            });
        }
        Ok(())
    }

    /// Returns true if a domain is set and it isn't localhost.
    #[must_use]
    pub fn secure(&self) -> bool {
        !self.domain.is_empty() && self.domain != "localhost"
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            domain: String::new(),
            session_ttl: Self::DEFAULT_SESSION_TTL,
            login_timebox: Self::DEFAULT_LOGIN_TIMEBOX,
        }
    }
}

// Never prints the secret itself.
impl fmt::Display for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.secret.is_empty() { "UNSET" } else { "SET" };
        let domain = if self.domain.is_empty() {
            "UNSET"
        } else {
            self.domain.as_str()
        };
        write!(
            f,
            "secret={secret}, domain={domain}, session_ttl={:?}, login_timebox={:?}",
            self.session_ttl, self.login_timebox
        )
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret", &"<redacted>")
            .field("domain", &self.domain)
            .field("session_ttl", &self.session_ttl)
            .field("login_timebox", &self.login_timebox)
            .finish()
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a boolean"),
        }),
    }
}

fn parse_duration_var(name: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).map_err(|message| ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    })
}

/// Parse a duration such as `12h`, `1h30m`, `1.5s` or `500ms`.
///
/// The input is a sequence of decimal numbers, each followed by a unit
/// (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`). A bare `0` is also accepted.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.starts_with('-') {
        return Err(format!("'{input}' is negative"));
    }
    let rest = input.strip_prefix('+').unwrap_or(input);
    if rest.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = rest;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(format!("'{input}' is not a valid duration"));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("'{input}' is not a valid duration"))?;

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            "" => return Err(format!("missing unit in duration '{input}'")),
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };

        let nanos = (value * nanos_per_unit).round();
        #[allow(clippy::cast_precision_loss)]
        let limit = u64::MAX as f64;
        if !nanos.is_finite() || nanos >= limit {
            return Err(format!("'{input}' is out of range"));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let part = Duration::from_nanos(nanos as u64);
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("'{input}' is out of range"))?;
        rest = after;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        assert_eq!(ServerConfig::DEFAULT_PORT, 8000);
        assert_eq!(
            SecurityConfig::DEFAULT_SESSION_TTL,
            Duration::from_secs(43_200)
        );
        assert_eq!(
            SecurityConfig::DEFAULT_LOGIN_TIMEBOX,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_server_config_defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).expect("defaults load");
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:8000");
    }

    #[test]
    fn test_server_config_development_binds_localhost() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GATEHOUSE_LISTEN_PORT", "9090"),
            ("GATEHOUSE_DEVELOPMENT", "true"),
        ]))
        .expect("valid config");
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:9090");
    }

    #[test]
    fn test_server_config_timeouts() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GATEHOUSE_READ_TIMEOUT", "5s"),
            ("GATEHOUSE_WRITE_TIMEOUT", "0"),
        ]))
        .expect("valid config");
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::ZERO);

        let defaults = ServerConfig::default();
        assert_eq!(defaults.read_timeout, Duration::from_secs(60));
        assert_eq!(defaults.write_timeout, Duration::from_secs(60));

        let result = ServerConfig::from_lookup(lookup(&[("GATEHOUSE_WRITE_TIMEOUT", "soon")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "GATEHOUSE_WRITE_TIMEOUT"
        ));
    }

    #[test]
    fn test_limiter_config_defaults() {
        let config = LimiterConfig::from_lookup("", lookup(&[])).expect("defaults load");
        assert_eq!(config, LimiterConfig::default());
        assert_eq!(config.limit, 100);
        assert_eq!(config.ttl, Duration::from_secs(1));
        assert_eq!(config.replenish_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_limiter_config_named_variables() {
        let vars = [
            ("GATEHOUSE_LIMITER_LIMIT", "7"),
            ("GATEHOUSE_LOGIN_LIMITER_LIMIT", "5"),
            ("GATEHOUSE_LOGIN_LIMITER_TTL", "1m"),
        ];

        let login = LimiterConfig::from_lookup("login", lookup(&vars)).expect("valid config");
        assert_eq!(login.name, "login");
        assert_eq!(login.limit, 5);
        assert_eq!(login.ttl, Duration::from_secs(60));
        assert_eq!(login.replenish_interval(), Duration::from_secs(12));

        let unnamed = LimiterConfig::from_lookup("", lookup(&vars)).expect("valid config");
        assert_eq!(unnamed.limit, 7);
        assert_eq!(unnamed.ttl, LimiterConfig::DEFAULT_TTL);
    }

    #[test]
    fn test_limiter_config_rejects_zero() {
        let result = LimiterConfig::from_lookup("", lookup(&[("GATEHOUSE_LIMITER_LIMIT", "0")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "GATEHOUSE_LIMITER_LIMIT"
        ));

        let result = LimiterConfig::from_lookup("", lookup(&[("GATEHOUSE_LIMITER_TTL", "0")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "GATEHOUSE_LIMITER_TTL"
        ));

        let result = LimiterConfig::from_lookup(
            "",
            lookup(&[("GATEHOUSE_LIMITER_LIMIT", "1000"), ("GATEHOUSE_LIMITER_TTL", "100ns")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_server_config_invalid_port() {
        let result = ServerConfig::from_lookup(lookup(&[("GATEHOUSE_LISTEN_PORT", "99999")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "GATEHOUSE_LISTEN_PORT"
        ));
    }

    #[test]
    fn test_server_config_invalid_bool() {
        let result = ServerConfig::from_lookup(lookup(&[("GATEHOUSE_DEVELOPMENT", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_security_config_from_lookup() {
        let config = SecurityConfig::from_lookup(lookup(&[
            ("GATEHOUSE_SECRET", "s3cret"),
            ("GATEHOUSE_DOMAIN", "example.com"),
            ("GATEHOUSE_SESSION_TTL", "1h30m"),
            ("GATEHOUSE_LOGIN_TIMEBOX", "250ms"),
        ]))
        .expect("valid config");

        assert_eq!(config.secret, "s3cret");
        assert!(config.secure());
        assert_eq!(config.session_ttl, Duration::from_secs(5_400));
        assert_eq!(config.login_timebox, Duration::from_millis(250));
    }

    #[test]
    fn test_security_config_defaults() {
        let config = SecurityConfig::from_lookup(lookup(&[])).expect("defaults load");
        assert_eq!(config, SecurityConfig::default());
        assert!(!config.secure());
    }

    #[test]
    fn test_security_config_negative_ttl_rejected() {
        let result = SecurityConfig::from_lookup(lookup(&[("GATEHOUSE_SESSION_TTL", "-1s")]));
        assert_eq!(
            result,
            Err(ConfigError::InvalidValue {
                name: "GATEHOUSE_SESSION_TTL".to_string(),
                message: "'-1s' is negative".to_string(),
            })
        );
    }

    #[test]
    fn test_require_secret() {
        assert_eq!(
            SecurityConfig::default().require_secret(),
            Err(ConfigError::InvalidValue {
                name: "GATEHOUSE_SECRET".to_string(),
                message: "must be set".to_string(),
            })
        );

        let config = SecurityConfig::from_lookup(lookup(&[("GATEHOUSE_SECRET", "s3cret")]))
            .expect("valid config");
        assert_eq!(config.require_secret(), Ok(()));
    }

    #[test]
    fn test_localhost_is_not_secure() {
        let config = SecurityConfig {
            domain: "localhost".to_string(),
            ..SecurityConfig::default()
        };
        assert!(!config.secure());
    }

    #[test]
    fn test_security_config_display_masks_secret() {
        let config = SecurityConfig {
            secret: "hunter2".to_string(),
            ..SecurityConfig::default()
        };
        let shown = config.to_string();
        assert!(shown.contains("secret=SET"));
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));

        assert!(SecurityConfig::default().to_string().contains("secret=UNSET"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("12h"), Ok(Duration::from_secs(43_200)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1_500)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("2m3s"), Ok(Duration::from_secs(123)));
        assert_eq!(parse_duration("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("7ns"), Ok(Duration::from_nanos(7)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("12").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("3 days").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("-5m").is_err());
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
