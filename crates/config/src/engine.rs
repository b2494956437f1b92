//! Decision engine configuration structures.

use std::{collections::BTreeMap, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;

use crate::StorageConfig;

/// Tier names that may carry rate-limit policies.
///
/// The unlimited tier is deliberately absent: requests for it bypass the
/// engine and no policy can be attached to it.
pub const POLICY_TIERS: [&str; 3] = ["free", "premium", "enterprise"];

/// Configuration for the rate-limit decision engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Shared store backend configuration.
    pub storage: StorageConfig,
    /// Rate-limit policies keyed by tier name, then endpoint.
    pub policies: BTreeMap<String, BTreeMap<String, PolicyConfig>>,
    /// Region multipliers applied to policy ceilings before evaluation.
    pub regions: BTreeMap<String, f64>,
    /// Slow-start ramp applied to newly seen identities.
    pub slow_start: SlowStartConfig,
    /// Local cache of recent allow decisions.
    pub cache: CacheConfig,
    /// Audit log of security events.
    pub audit: AuditConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            policies: default_policies(),
            regions: default_regions(),
            slow_start: SlowStartConfig::default(),
            cache: CacheConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// A rate-limit policy for one `(tier, endpoint)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Steady-state ceiling of admitted tokens per window.
    pub max: u64,
    /// Bucket capacity.
    pub burst: u64,
    /// Window length, which is also the lifetime of bucket entries in the
    /// shared store.
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
}

/// Slow-start configuration for newly seen identities.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SlowStartConfig {
    /// Whether the slow-start ramp is applied.
    pub enabled: bool,
    /// Ramp duration; also the lifetime of the first-seen marker.
    #[serde(deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    /// Ascending multipliers, each within `(0, 1]`, applied per ramp stage.
    pub stages: Vec<f64>,
}

impl Default for SlowStartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration: Duration::from_secs(3600),
            stages: vec![0.3, 0.6, 1.0],
        }
    }
}

/// Local decision cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Whether allow decisions are memoized locally.
    pub enabled: bool,
    /// Lifetime of a cached allow decision.
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(1),
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuditConfig {
    /// Whether security events are recorded.
    pub enabled: bool,
    /// Ring capacity; the oldest events are evicted first when full.
    pub max_events: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_events: 1000,
        }
    }
}

fn policy(max: u64, burst: u64) -> PolicyConfig {
    PolicyConfig {
        max,
        burst,
        window: Duration::from_secs(3600),
    }
}

/// The policy table shipped as the default.
fn default_policies() -> BTreeMap<String, BTreeMap<String, PolicyConfig>> {
    let free = BTreeMap::from([
        ("/api/search".to_string(), policy(100, 20)),
        ("/api/checkout".to_string(), policy(10, 2)),
        ("/api/profile".to_string(), policy(50, 10)),
    ]);

    let premium = BTreeMap::from([
        ("/api/search".to_string(), policy(1000, 100)),
        ("/api/checkout".to_string(), policy(100, 20)),
        ("/api/profile".to_string(), policy(200, 40)),
    ]);

    let enterprise = BTreeMap::from([
        ("/api/search".to_string(), policy(10000, 1000)),
        ("/api/checkout".to_string(), policy(1000, 200)),
        ("/api/profile".to_string(), policy(1000, 200)),
    ]);

    BTreeMap::from([
        ("free".to_string(), free),
        ("premium".to_string(), premium),
        ("enterprise".to_string(), enterprise),
    ])
}

fn default_regions() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("US".to_string(), 1.0),
        ("EU".to_string(), 1.0),
        ("CN".to_string(), 0.5),
        ("IN".to_string(), 2.0),
        ("DEFAULT".to_string(), 1.0),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_table() {
        let config = EngineConfig::default();

        let free_search = config.policies["free"]["/api/search"];
        assert_eq!(free_search.max, 100);
        assert_eq!(free_search.burst, 20);
        assert_eq!(free_search.window, Duration::from_secs(3600));

        let enterprise_checkout = config.policies["enterprise"]["/api/checkout"];
        assert_eq!(enterprise_checkout.max, 1000);
        assert_eq!(enterprise_checkout.burst, 200);

        assert!(!config.policies.contains_key("unlimited"));
    }

    #[test]
    fn default_region_multipliers() {
        let config = EngineConfig::default();

        assert_eq!(config.regions["US"], 1.0);
        assert_eq!(config.regions["CN"], 0.5);
        assert_eq!(config.regions["IN"], 2.0);
        assert_eq!(config.regions["DEFAULT"], 1.0);
    }

    #[test]
    fn deserialize_policy_override() {
        let toml = r#"
            max = 42
            burst = 7
            window = "60s"
        "#;

        let config: PolicyConfig = toml::from_str(toml).unwrap();

        insta::assert_debug_snapshot!(config, @r"
        PolicyConfig {
            max: 42,
            burst: 7,
            window: 60s,
        }
        ");
    }

    #[test]
    fn deserialize_slow_start() {
        let toml = r#"
            enabled = true
            duration = "60s"
            stages = [0.25, 0.5, 0.75, 1.0]
        "#;

        let config: SlowStartConfig = toml::from_str(toml).unwrap();

        assert!(config.enabled);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.stages, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn cache_defaults() {
        let config = CacheConfig::default();

        assert!(config.enabled);
        assert_eq!(config.ttl, Duration::from_secs(1));
    }
}
