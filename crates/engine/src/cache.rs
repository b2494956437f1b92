//! Process-local cache of recent allow decisions.

use std::time::{Duration, Instant};

use config::CacheConfig;
use dashmap::DashMap;

use crate::decision::Decision;
use crate::request::Tier;

struct CachedDecision {
    decision: Decision,
    expires_at: Instant,
}

/// Short-TTL memoization of allow decisions, collapsing bursts of identical
/// calls without contacting the shared store.
///
/// Denials are never cached; a cached denial would keep rejecting callers
/// past the moment the bucket refills. Expired entries are dropped at lookup
/// time, so no background sweeper runs.
pub(crate) struct DecisionCache {
    entries: DashMap<String, CachedDecision>,
    ttl: Duration,
    enabled: bool,
}

impl DecisionCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl,
            enabled: config.enabled,
        }
    }

    /// Cache key for one `(identity, endpoint, tier)` combination.
    pub fn key(identity: &str, endpoint: &str, tier: Tier) -> String {
        format!("check:{identity}:{endpoint}:{tier}")
    }

    pub fn lookup(&self, key: &str) -> Option<Decision> {
        if !self.enabled {
            return None;
        }

        let entry = self.entries.get(key)?;

        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }

        Some(entry.decision.clone())
    }

    /// Memoize an allow decision. Denials are ignored.
    pub fn store(&self, key: String, decision: &Decision) {
        if !self.enabled || !decision.allowed {
            return;
        }

        self.entries.insert(
            key,
            CachedDecision {
                decision: decision.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every cached decision for an identity, across endpoints and
    /// tiers. Called when an identity's tier is reassigned.
    pub fn clear_for(&self, identity: &str) {
        let prefix = format!("check:{identity}:");
        self.entries.retain(|key, _| !key.starts_with(&prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Remaining;

    fn cache(ttl: Duration) -> DecisionCache {
        DecisionCache::new(&CacheConfig { enabled: true, ttl })
    }

    fn allow() -> Decision {
        Decision {
            allowed: true,
            remaining: Remaining::Limited(5),
            retry_after_seconds: 0,
            cost: 1,
        }
    }

    fn deny() -> Decision {
        Decision {
            allowed: false,
            remaining: Remaining::Limited(0),
            retry_after_seconds: 30,
            cost: 1,
        }
    }

    #[test]
    fn stores_and_returns_allows() {
        let cache = cache(Duration::from_secs(1));
        let key = DecisionCache::key("alice", "/api/search", Tier::Free);

        assert!(cache.lookup(&key).is_none());

        cache.store(key.clone(), &allow());

        assert_eq!(cache.lookup(&key), Some(allow()));
    }

    #[test]
    fn never_stores_denials() {
        let cache = cache(Duration::from_secs(1));
        let key = DecisionCache::key("alice", "/api/search", Tier::Free);

        cache.store(key.clone(), &deny());

        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn entries_expire_at_lookup() {
        let cache = cache(Duration::ZERO);
        let key = DecisionCache::key("alice", "/api/search", Tier::Free);

        cache.store(key.clone(), &allow());

        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn clear_for_scopes_to_one_identity() {
        let cache = cache(Duration::from_secs(60));

        let alice = DecisionCache::key("alice", "/api/search", Tier::Free);
        let bob = DecisionCache::key("bob", "/api/search", Tier::Free);

        cache.store(alice.clone(), &allow());
        cache.store(bob.clone(), &allow());

        cache.clear_for("alice");

        assert!(cache.lookup(&alice).is_none());
        assert!(cache.lookup(&bob).is_some());
    }

    #[test]
    fn disabled_cache_is_inert() {
        let cache = DecisionCache::new(&CacheConfig {
            enabled: false,
            ttl: Duration::from_secs(60),
        });

        let key = DecisionCache::key("alice", "/api/search", Tier::Free);
        cache.store(key.clone(), &allow());

        assert!(cache.lookup(&key).is_none());
    }
}
