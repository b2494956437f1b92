//! Shared store backend configuration.

use std::time::Duration;

use duration_str::deserialize_option_duration;
use serde::Deserialize;

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process storage, for single-instance deployments and tests.
    Memory,
    /// Redis storage shared across the frontend fleet.
    Redis(Box<RedisConfig>),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Redis storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Connection pool configuration.
    #[serde(default)]
    pub pool: RedisPoolConfig,
    /// Key prefix for all engine keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Response timeout for Redis commands.
    #[serde(
        default = "default_response_timeout",
        deserialize_with = "deserialize_option_duration"
    )]
    pub response_timeout: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool: RedisPoolConfig::default(),
            key_prefix: default_key_prefix(),
            response_timeout: default_response_timeout(),
        }
    }
}

fn default_key_prefix() -> String {
    "tollgate:rate_limit:".to_string()
}

fn default_response_timeout() -> Option<Duration> {
    Some(Duration::from_secs(1))
}

/// Redis connection pool configuration (deadpool).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisPoolConfig {
    /// Maximum number of connections.
    pub max_size: Option<usize>,
    /// Timeout for creating connections.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub timeout_create: Option<Duration>,
    /// Timeout for waiting for a connection.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub timeout_wait: Option<Duration>,
    /// Timeout before recycling idle connections.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub timeout_recycle: Option<Duration>,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_size: Some(16),
            timeout_create: Some(Duration::from_secs(5)),
            timeout_wait: Some(Duration::from_secs(5)),
            timeout_recycle: Some(Duration::from_secs(300)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_storage_config() {
        let config = StorageConfig::default();
        insta::assert_debug_snapshot!(config, @"Memory");
    }

    #[test]
    fn deserialize_memory_storage() {
        let toml = r#"
            type = "memory"
        "#;
        let config: StorageConfig = toml::from_str(toml).unwrap();
        insta::assert_debug_snapshot!(config, @"Memory");
    }

    #[test]
    fn deserialize_redis_storage_minimal() {
        let toml = r#"
            type = "redis"
            url = "redis://localhost:6379/0"
        "#;

        let StorageConfig::Redis(config) = toml::from_str(toml).unwrap() else {
            panic!("expected redis storage");
        };

        assert_eq!(config.url, "redis://localhost:6379/0");
        assert_eq!(config.key_prefix, "tollgate:rate_limit:");
        assert_eq!(config.response_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.pool.max_size, Some(16));
    }

    #[test]
    fn deserialize_redis_storage_full() {
        let toml = r#"
            type = "redis"
            url = "redis://cache.internal:6379/1"
            key_prefix = "shop:limits:"
            response_timeout = "2s"

            [pool]
            max_size = 32
            timeout_create = "10s"
            timeout_wait = "2s"
            timeout_recycle = "600s"
        "#;

        let StorageConfig::Redis(config) = toml::from_str(toml).unwrap() else {
            panic!("expected redis storage");
        };

        assert_eq!(config.key_prefix, "shop:limits:");
        assert_eq!(config.response_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.pool.max_size, Some(32));
        assert_eq!(config.pool.timeout_wait, Some(Duration::from_secs(2)));
    }
}
