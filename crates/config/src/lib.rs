//! Tollgate configuration structures to map the tollgate.toml configuration.

#![deny(missing_docs)]

mod engine;
mod loader;
mod storage;

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::Path,
};

pub use engine::{
    AuditConfig, CacheConfig, EngineConfig, POLICY_TIERS, PolicyConfig, SlowStartConfig,
};
use serde::Deserialize;
pub use storage::{RedisConfig, RedisPoolConfig, StorageConfig};

/// Main configuration structure for the Tollgate application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// HTTP server configuration settings.
    pub server: ServerConfig,
    /// Rate-limit decision engine configuration settings.
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }
}

/// Address the server binds when neither the CLI nor the configuration
/// file provides one.
pub const DEFAULT_LISTEN_ADDRESS: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 7700));

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint configuration.
    pub health: HealthConfig,
}

impl ServerConfig {
    /// The configured listen address, or [`DEFAULT_LISTEN_ADDRESS`].
    pub fn listen_address_or_default(&self) -> SocketAddr {
        self.listen_address.unwrap_or(DEFAULT_LISTEN_ADDRESS)
    }
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HealthConfig {
    /// Whether the health endpoint is exposed.
    pub enabled: bool,
    /// Path the health endpoint is served from.
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_address_falls_back_to_default() {
        let config = ServerConfig::default();

        assert_eq!(config.listen_address_or_default(), DEFAULT_LISTEN_ADDRESS);

        let config = ServerConfig {
            listen_address: Some("0.0.0.0:9000".parse().unwrap()),
            ..ServerConfig::default()
        };

        assert_eq!(
            config.listen_address_or_default(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );
    }
}
