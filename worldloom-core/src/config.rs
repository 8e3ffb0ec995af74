//! Configuration types

use crate::{ConfigError, LoomResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache behavior configuration.
///
/// Process-wide state initialized at startup; see the cache crate for the
/// auto-reset lifecycle hooks driven by `stats_reset_period`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a `set` does not specify one.
    pub default_ttl: Duration,
    /// Whether per-type hit/miss counters are maintained.
    pub metrics_enabled: bool,
    /// Whether individual cache operations are logged at debug level.
    pub logging_enabled: bool,
    /// Whether aggregate statistics snapshots are tracked.
    pub stats_tracking_enabled: bool,
    /// Auto-reset period for time-windowed stats reporting; `None` disables.
    pub stats_reset_period: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            metrics_enabled: true,
            logging_enabled: false,
            stats_tracking_enabled: true,
            stats_reset_period: None,
        }
    }
}

impl CacheConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `CACHE_DEFAULT_TTL`: default TTL in seconds (default: 300)
    /// - `CACHE_METRICS_ENABLED`: per-type counters (default: true)
    /// - `CACHE_LOGGING_ENABLED`: per-operation debug logging (default: false)
    /// - `CACHE_STATS_TRACKING_ENABLED`: aggregate snapshots (default: true)
    /// - `CACHE_STATS_RESET_PERIOD_MS`: auto-reset period, 0 disables (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let reset_period_ms: u64 = std::env::var("CACHE_STATS_RESET_PERIOD_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Self {
            default_ttl: std::env::var("CACHE_DEFAULT_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            metrics_enabled: env_bool("CACHE_METRICS_ENABLED", defaults.metrics_enabled),
            logging_enabled: env_bool("CACHE_LOGGING_ENABLED", defaults.logging_enabled),
            stats_tracking_enabled: env_bool(
                "CACHE_STATS_TRACKING_ENABLED",
                defaults.stats_tracking_enabled,
            ),
            stats_reset_period: (reset_period_ms > 0)
                .then(|| Duration::from_millis(reset_period_ms)),
        }
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Enable or disable per-operation logging.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Set the stats auto-reset period.
    pub fn with_stats_reset_period(mut self, period: Option<Duration>) -> Self {
        self.stats_reset_period = period;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LoomResult<()> {
        if self.default_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "default_ttl".to_string(),
                value: format!("{:?}", self.default_ttl),
                reason: "default_ttl must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database for cache entries (database 0 is reserved for pub/sub).
    pub cache_db: i64,
    /// Namespace prefix prepended to every stored key.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            cache_db: 1,
            key_prefix: "cache:".to_string(),
        }
    }
}

impl RedisConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `REDIS_HOST` (default: 127.0.0.1)
    /// - `REDIS_PORT` (default: 6379)
    /// - `REDIS_PASSWORD` (optional)
    /// - `REDIS_CACHE_DB` (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            password: std::env::var("REDIS_PASSWORD").ok(),
            cache_db: std::env::var("REDIS_CACHE_DB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_db),
            key_prefix: defaults.key_prefix,
        }
    }

    /// Connection URL in `redis://` form.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.cache_db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.cache_db),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|s| match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert!(config.metrics_enabled);
        assert!(!config.logging_enabled);
        assert!(config.stats_tracking_enabled);
        assert!(config.stats_reset_period.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = CacheConfig::default().with_default_ttl(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_url() {
        let config = RedisConfig::default();
        assert_eq!(config.url(), "redis://127.0.0.1:6379/1");

        let with_password = RedisConfig {
            password: Some("hunter2".to_string()),
            ..RedisConfig::default()
        };
        assert_eq!(with_password.url(), "redis://:hunter2@127.0.0.1:6379/1");
    }
}
