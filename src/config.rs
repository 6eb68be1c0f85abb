//! Runtime configuration read from the environment (`.env` is loaded first when present).
use crate::constants::{
    CACHE_RETRIEVE_TIMEOUT_MS, MAX_CACHE_TTL_MS, SESSION_CACHE_TTL_MS, USER_CACHE_TTL_MS,
};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Expected {0} in the environment.")]
    Missing(&'static str),
    #[error("{name} must be {expected}, got `{value}`.")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Lifetimes for the per-domain caches. Zero disables expiry for that cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub user_ttl: Duration,
    pub session_ttl: Duration,
    pub retrieve_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            user_ttl: Duration::from_millis(USER_CACHE_TTL_MS),
            session_ttl: Duration::from_millis(SESSION_CACHE_TTL_MS),
            retrieve_timeout: Duration::from_millis(CACHE_RETRIEVE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub server_id: u64,
    /// A postgres URL, or `memory` for the in-memory store.
    pub database_url: String,
    pub caches: CacheSettings,
    pub admin_ids: Vec<u64>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse<T: FromStr>(name: &'static str, value: &str, expected: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        expected,
        value: value.to_string(),
    })
}

/// Milliseconds, at most `MAX_CACHE_TTL_MS` (one year).
pub fn parse_millis(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    const EXPECTED: &str = "a number of milliseconds no larger than 31536000000";
    let ms = parse::<u64>(name, raw, EXPECTED)?;
    if ms > MAX_CACHE_TTL_MS {
        return Err(ConfigError::Invalid {
            name,
            expected: EXPECTED,
            value: raw.to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

fn millis_or(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(v) => parse_millis(name, &v),
        Err(_) => Ok(default),
    }
}

/// Comma separated Discord ids; blanks are ignored.
pub fn parse_id_list(name: &'static str, raw: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse::<u64>(name, s, "a comma separated list of ids"))
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is fine in containers where the variables are injected.
        dotenv::dotenv().ok();

        let server_id_str = required("SERVER_ID")?;
        let defaults = CacheSettings::default();
        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            server_id: parse("SERVER_ID", &server_id_str, "a valid number")?,
            database_url: required("DATABASE_URL")?,
            caches: CacheSettings {
                user_ttl: millis_or("USER_CACHE_TTL_MS", defaults.user_ttl)?,
                session_ttl: millis_or("SESSION_CACHE_TTL_MS", defaults.session_ttl)?,
                retrieve_timeout: millis_or("CACHE_RETRIEVE_TIMEOUT_MS", defaults.retrieve_timeout)?,
            },
            admin_ids: match env::var("ADMIN_USER_IDS") {
                Ok(raw) => parse_id_list("ADMIN_USER_IDS", &raw)?,
                Err(_) => Vec::new(),
            },
        })
    }
}
