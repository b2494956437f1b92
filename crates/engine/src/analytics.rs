//! In-memory analytics counters keyed by `(endpoint, tier, region)`.

use dashmap::DashMap;
use serde::Serialize;

use crate::request::Tier;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AnalyticsKey {
    endpoint: String,
    tier: Tier,
    region: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    allowed: u64,
    denied: u64,
}

/// Best-effort, process-local decision counters. Nothing here is persisted;
/// a restart forgets the history.
#[derive(Default)]
pub(crate) struct AnalyticsRecorder {
    buckets: DashMap<AnalyticsKey, Counters>,
}

impl AnalyticsRecorder {
    /// Count one decision. Called exactly once per decision the engine
    /// returns, whichever path produced it.
    pub fn record(&self, endpoint: &str, tier: Tier, region: &str, allowed: bool) {
        let key = AnalyticsKey {
            endpoint: endpoint.to_string(),
            tier,
            region: region.to_string(),
        };

        let mut counters = self.buckets.entry(key).or_default();

        if allowed {
            counters.allowed += 1;
        } else {
            counters.denied += 1;
        }
    }

    /// Snapshot of every combination seen so far, with aggregate totals.
    pub fn report(&self) -> AnalyticsReport {
        let mut buckets: Vec<AnalyticsBucket> = self
            .buckets
            .iter()
            .map(|entry| {
                let key = entry.key();
                let counters = entry.value();
                let total = counters.allowed + counters.denied;

                AnalyticsBucket {
                    endpoint: key.endpoint.clone(),
                    tier: key.tier,
                    region: key.region.clone(),
                    allowed: counters.allowed,
                    denied: counters.denied,
                    total,
                    allow_rate: if total == 0 {
                        0.0
                    } else {
                        counters.allowed as f64 / total as f64
                    },
                }
            })
            .collect();

        buckets.sort_by(|a, b| {
            (a.endpoint.as_str(), a.tier, a.region.as_str())
                .cmp(&(b.endpoint.as_str(), b.tier, b.region.as_str()))
        });

        let total_allowed = buckets.iter().map(|bucket| bucket.allowed).sum::<u64>();
        let total_denied = buckets.iter().map(|bucket| bucket.denied).sum::<u64>();

        AnalyticsReport {
            total_allowed,
            total_denied,
            total: total_allowed + total_denied,
            buckets,
        }
    }
}

/// Counters for one `(endpoint, tier, region)` combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsBucket {
    /// Endpoint the decisions were made for.
    pub endpoint: String,
    /// Tier of the callers.
    pub tier: Tier,
    /// Region of the callers.
    pub region: String,
    /// Admitted requests.
    pub allowed: u64,
    /// Denied requests.
    pub denied: u64,
    /// All requests.
    pub total: u64,
    /// Share of requests that were admitted.
    pub allow_rate: f64,
}

/// Snapshot of the analytics counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    /// Admitted requests across all combinations.
    pub total_allowed: u64,
    /// Denied requests across all combinations.
    pub total_denied: u64,
    /// All requests across all combinations.
    pub total: u64,
    /// Per-combination counters, sorted for stable output.
    pub buckets: Vec<AnalyticsBucket>,
}
