use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Every
/// setting has a default, so `sentinel init` works on a clean checkout.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// The engine's own platform identity. Privileged actions it takes
    /// itself (e.g. banning a spammer) are never counted against it.
    pub self_id: Option<String>,
    /// Upper bound on any single platform call made during enforcement.
    pub action_timeout: Duration,
    /// How often idle windows are swept.
    pub sweep_interval: Duration,
    /// Windows untouched for this long are evicted. Should comfortably
    /// exceed the largest configured detection window.
    pub max_idle: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable numeric values fall back to their defaults with a warning
    /// instead of failing startup.
    pub fn load() -> Result<Self> {
        Ok(Self {
            db_path: env::var("SENTINEL_DB_PATH").unwrap_or_else(|_| "./sentinel.db".to_string()),
            self_id: env::var("SENTINEL_SELF_ID").ok().filter(|s| !s.is_empty()),
            action_timeout: Duration::from_millis(parse_or("SENTINEL_ACTION_TIMEOUT_MS", 5_000)),
            sweep_interval: Duration::from_secs(parse_or("SENTINEL_SWEEP_INTERVAL_SECS", 60)),
            max_idle: Duration::from_secs(parse_or("SENTINEL_MAX_IDLE_SECS", 600)),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./sentinel.db".to_string(),
            self_id: None,
            action_timeout: Duration::from_millis(5_000),
            sweep_interval: Duration::from_secs(60),
            max_idle: Duration::from_secs(600),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_value<T: FromStr + Copy + std::fmt::Display>(key: &str, raw: &str, default: T) -> T {
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value = raw, %default, "Invalid numeric setting, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_falls_back_on_garbage() {
        assert_eq!(parse_value("SENTINEL_MAX_IDLE_SECS", "abc", 600u64), 600);
        assert_eq!(parse_value("SENTINEL_MAX_IDLE_SECS", " 120 ", 600u64), 120);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.db_path, "./sentinel.db");
        assert_eq!(config.action_timeout, Duration::from_millis(5_000));
        assert!(config.max_idle > Duration::from_secs(10));
    }
}
