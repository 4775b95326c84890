//! Process configuration.
//!
//! Loaded once from `GATEHOUSE_*` environment variables, validated, and then
//! frozen behind an `Arc`. Every field is private: once the server is
//! accepting traffic nothing can change the cookie name or session lifetime
//! out from under an in-flight request.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::info;

const PREFIX: &str = "GATEHOUSE_";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ENV: &str = "dev";
const DEFAULT_COOKIE_NAME: &str = "__session";
const DEFAULT_LIFETIME_SECS: u64 = 30 * 60;
const MAX_LIFETIME_SECS: u64 = 366 * 24 * 60 * 60;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// HMAC-SHA256 keys shorter than this are refused.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config: {0} was not set")]
    Missing(String),

    #[error("config: {key} has invalid value `{value}`")]
    Invalid { key: String, value: String },

    #[error("config: GATEHOUSE_SESSION_SECRET must be at least 32 bytes")]
    WeakSecret,
}

/// Immutable application configuration.
#[derive(Clone)]
pub struct Config {
    port: u16,
    env: String,
    cookie_name: String,
    session_lifetime: Duration,
    max_body_bytes: usize,
    secret: Vec<u8>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which receives full variable
    /// names such as `GATEHOUSE_PORT`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{PREFIX}{name}");
            let value = lookup(&key).filter(|v| !v.trim().is_empty());
            (key, value)
        };

        let port = match get("PORT") {
            (_, None) => DEFAULT_PORT,
            (key, Some(v)) => parse(key, v)?,
        };

        let lifetime_secs: u64 = match get("SESSION_LIFETIME_SECS") {
            (_, None) => DEFAULT_LIFETIME_SECS,
            (key, Some(v)) => match parse(key.clone(), v.clone())? {
                0 => return Err(ConfigError::Invalid { key, value: v }),
                secs if secs > MAX_LIFETIME_SECS => return Err(ConfigError::Invalid { key, value: v }),
                secs => secs,
            },
        };

        let max_body_bytes: usize = match get("MAX_BODY_BYTES") {
            (_, None) => DEFAULT_MAX_BODY_BYTES,
            (key, Some(v)) => match parse(key.clone(), v.clone())? {
                0 => return Err(ConfigError::Invalid { key, value: v }),
                bytes => bytes,
            },
        };

        let secret = match get("SESSION_SECRET") {
            (key, None) => return Err(ConfigError::Missing(key)),
            (_, Some(v)) if v.len() < MIN_SECRET_LEN => return Err(ConfigError::WeakSecret),
            (_, Some(v)) => v.into_bytes(),
        };

        Ok(Self {
            port,
            env: get("ENV").1.unwrap_or_else(|| DEFAULT_ENV.to_owned()),
            cookie_name: get("SESSION_COOKIE").1.unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_owned()),
            session_lifetime: Duration::from_secs(lifetime_secs),
            max_body_bytes,
            secret,
        })
    }

    /// Builds a config directly. Intended for tests and embedding.
    pub fn new(cookie_name: impl Into<String>, session_lifetime: Duration, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            port: DEFAULT_PORT,
            env: DEFAULT_ENV.to_owned(),
            cookie_name: cookie_name.into(),
            session_lifetime,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            secret: secret.into(),
        }
    }

    /// Overrides the request body cap.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn port(&self) -> u16 { self.port }
    pub fn env(&self) -> &str { &self.env }
    pub fn cookie_name(&self) -> &str { &self.cookie_name }
    pub fn session_lifetime(&self) -> Duration { self.session_lifetime }
    /// Largest request body the server buffers; anything bigger gets 413.
    pub fn max_body_bytes(&self) -> usize { self.max_body_bytes }
    pub(crate) fn secret(&self) -> &[u8] { &self.secret }

    /// Address the server binds to: all interfaces on the configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Logs the configuration. The signing secret is never printed.
    pub fn log_summary(&self) {
        info!(
            port = self.port,
            env = %self.env,
            cookie = %self.cookie_name,
            session_lifetime_secs = self.session_lifetime.as_secs(),
            max_body_bytes = self.max_body_bytes,
            "configuration loaded"
        );
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("env", &self.env)
            .field("cookie_name", &self.cookie_name)
            .field("session_lifetime", &self.session_lifetime)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn parse<T: std::str::FromStr>(key: String, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid { key, value })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = Config::from_lookup(lookup(&[("SESSION_SECRET", SECRET)])).unwrap();
        assert_eq!(cfg.port(), 3000);
        assert_eq!(cfg.env(), "dev");
        assert_eq!(cfg.cookie_name(), "__session");
        assert_eq!(cfg.session_lifetime(), Duration::from_secs(1800));
        assert_eq!(cfg.max_body_bytes(), 1024 * 1024);
    }

    #[test]
    fn body_cap_is_read_and_must_be_positive() {
        let cfg = Config::from_lookup(lookup(&[
            ("SESSION_SECRET", SECRET),
            ("MAX_BODY_BYTES", "4096"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_body_bytes(), 4096);

        let err = Config::from_lookup(lookup(&[
            ("SESSION_SECRET", SECRET),
            ("MAX_BODY_BYTES", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "GATEHOUSE_MAX_BODY_BYTES"));
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref k) if k == "GATEHOUSE_SESSION_SECRET"));
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[("SESSION_SECRET", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = Config::from_lookup(lookup(&[("SESSION_SECRET", "short")])).unwrap_err();
        assert!(matches!(err, ConfigError::WeakSecret));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = Config::from_lookup(lookup(&[("SESSION_SECRET", SECRET), ("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "GATEHOUSE_PORT"));
    }

    #[test]
    fn zero_lifetime_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("SESSION_SECRET", SECRET),
            ("SESSION_LIFETIME_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn overrides_are_read() {
        let cfg = Config::from_lookup(lookup(&[
            ("SESSION_SECRET", SECRET),
            ("PORT", "8080"),
            ("ENV", "prod"),
            ("SESSION_COOKIE", "sid"),
            ("SESSION_LIFETIME_SECS", "600"),
        ]))
        .unwrap();
        assert_eq!(cfg.port(), 8080);
        assert_eq!(cfg.env(), "prod");
        assert_eq!(cfg.cookie_name(), "sid");
        assert_eq!(cfg.session_lifetime(), Duration::from_secs(600));
        assert_eq!(cfg.listen_addr().port(), 8080);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let cfg = Config::new("sid", Duration::from_secs(60), SECRET);
        let shown = format!("{cfg:?}");
        assert!(!shown.contains(SECRET));
        assert!(shown.contains("<redacted>"));
    }
}
