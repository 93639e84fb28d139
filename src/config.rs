use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("invalid password hashing parameters: {0}")]
    Hashing(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        // argon2 crate defaults (OWASP minimum for Argon2id)
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub hashing: HashingConfig,
    pub frontend_url: Option<String>,
    pub host: String,
    pub port: u16,
}

const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let ttl = match non_empty_var("JWT_EXPIRES_IN") {
            Some(raw) => parse_ttl(&raw).ok_or(ConfigError::Invalid {
                key: "JWT_EXPIRES_IN",
                value: raw,
            })?,
            None => DEFAULT_TTL,
        };

        let jwt = JwtConfig {
            secret,
            issuer: non_empty_var("JWT_ISSUER").unwrap_or_else(|| "userauth".into()),
            audience: non_empty_var("JWT_AUDIENCE").unwrap_or_else(|| "userauth-clients".into()),
            ttl,
        };

        let defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: parsed_var("ARGON2_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
            iterations: parsed_var("ARGON2_ITERATIONS")?.unwrap_or(defaults.iterations),
            parallelism: parsed_var("ARGON2_PARALLELISM")?.unwrap_or(defaults.parallelism),
        };

        let port = match parsed_var("APP_PORT")? {
            Some(p) => p,
            None => parsed_var("PORT")?.unwrap_or(5000),
        };

        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            jwt,
            hashing,
            frontend_url: non_empty_var("FRONTEND_URL"),
            host: non_empty_var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

/// Parses token lifetimes such as `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
/// Zero and anything above ten years are rejected.
pub fn parse_ttl(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let amount: u64 = digits.parse().ok()?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return None,
    };
    let secs = amount.checked_mul(multiplier)?;
    let ttl = Duration::from_secs(secs);
    if secs == 0 || ttl > MAX_TTL {
        return None;
    }
    Some(ttl)
}
