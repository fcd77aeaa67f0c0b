//! Configuration Module
//!
//! Handles loading the cache, retry and container settings from environment
//! variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::container::ContainerOptions;
use crate::retry::RetryPolicy;

/// Settings for the cache store and its maintenance sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// TTL applied when a `set` does not name one
    pub default_ttl: Duration,
    /// Capacity of the store in serialized bytes, also the default per-value limit
    pub max_size: usize,
    /// Maximum number of entries the store can hold
    pub max_entries: usize,
    /// Interval between maintenance sweeps
    pub maintenance_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(60_000),
            max_size: 5 * 1024 * 1024,
            max_entries: 1000,
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub container: ContainerOptions,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default entry TTL (default: 60000)
    /// - `CACHE_MAX_SIZE_BYTES` - Store capacity in bytes (default: 5 MiB)
    /// - `CACHE_MAX_ENTRIES` - Maximum entries (default: 1000)
    /// - `CACHE_MAINTENANCE_INTERVAL_SECS` - Sweep frequency (default: 60)
    /// - `RETRY_MAX_ATTEMPTS` - Attempts including the first (default: 3)
    /// - `RETRY_BASE_DELAY_MS` - First backoff delay (default: 1000)
    /// - `RETRY_MAX_DELAY_MS` - Backoff ceiling (default: 5000)
    /// - `RETRY_MAX_JITTER_MS` - Upper bound of random jitter (default: 100)
    /// - `CONTAINER_STRICT` - Fail on circular resolution (default: true)
    /// - `CONTAINER_AUTO_CREATE` - Return placeholders for unknown tokens (default: false)
    /// - `CONTAINER_MAX_DEPTH` - Maximum resolution depth (default: 10)
    pub fn from_env() -> Self {
        let cache_defaults = CacheConfig::default();
        let retry_defaults = RetryPolicy::default();
        let container_defaults = ContainerOptions::default();

        Self {
            cache: CacheConfig {
                default_ttl: Duration::from_millis(env_or(
                    "CACHE_DEFAULT_TTL_MS",
                    cache_defaults.default_ttl.as_millis() as u64,
                )),
                max_size: env_or("CACHE_MAX_SIZE_BYTES", cache_defaults.max_size),
                max_entries: env_or("CACHE_MAX_ENTRIES", cache_defaults.max_entries),
                maintenance_interval: Duration::from_secs(env_or(
                    "CACHE_MAINTENANCE_INTERVAL_SECS",
                    cache_defaults.maintenance_interval.as_secs(),
                )),
            },
            retry: RetryPolicy {
                max_attempts: env_or("RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts).max(1),
                base_delay: Duration::from_millis(env_or(
                    "RETRY_BASE_DELAY_MS",
                    retry_defaults.base_delay.as_millis() as u64,
                )),
                max_delay: Duration::from_millis(env_or(
                    "RETRY_MAX_DELAY_MS",
                    retry_defaults.max_delay.as_millis() as u64,
                )),
                max_jitter: Duration::from_millis(env_or(
                    "RETRY_MAX_JITTER_MS",
                    retry_defaults.max_jitter.as_millis() as u64,
                )),
            },
            container: ContainerOptions {
                strict: env_or("CONTAINER_STRICT", container_defaults.strict),
                auto_create: env_or("CONTAINER_AUTO_CREATE", container_defaults.auto_create),
                max_depth: env_or("CONTAINER_MAX_DEPTH", container_defaults.max_depth),
            },
        }
    }
}

/// Parses an environment variable, falling back to `default` when it is
/// unset or unparseable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache.default_ttl, Duration::from_secs(60));
        assert_eq!(config.cache.max_size, 5 * 1024 * 1024);
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.max_delay, Duration::from_millis(5000));
        assert!(config.container.strict);
        assert!(!config.container.auto_create);
        assert_eq!(config.container.max_depth, 10);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("KEYSTONE_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("KEYSTONE_TEST_GARBAGE", 42u64), 42);
        env::remove_var("KEYSTONE_TEST_GARBAGE");
    }

    #[test]
    fn test_env_or_parses_values() {
        env::set_var("KEYSTONE_TEST_BOOL", "false");
        env::set_var("KEYSTONE_TEST_NUM", " 17 ");
        assert!(!env_or("KEYSTONE_TEST_BOOL", true));
        assert_eq!(env_or("KEYSTONE_TEST_NUM", 0usize), 17);
        env::remove_var("KEYSTONE_TEST_BOOL");
        env::remove_var("KEYSTONE_TEST_NUM");
    }
}
