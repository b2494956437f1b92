//! Registry of rate-limit policies and region multipliers.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{PoisonError, RwLock, RwLockReadGuard},
    time::Duration,
};

use config::PolicyConfig;

use crate::request::Tier;

/// Region key applied when a request's region has no multiplier of its own.
const DEFAULT_REGION: &str = "DEFAULT";

/// A rate-limit policy for one `(tier, endpoint)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatePolicy {
    /// Steady-state ceiling of admitted tokens per window.
    pub max: u64,
    /// Bucket capacity.
    pub burst: u64,
    /// Window length; also the lifetime of bucket entries in the shared
    /// store.
    pub window: Duration,
}

impl From<PolicyConfig> for RatePolicy {
    fn from(config: PolicyConfig) -> Self {
        Self {
            max: config.max,
            burst: config.burst,
            window: config.window,
        }
    }
}

/// Process-local registry resolving `(tier, endpoint)` to a policy and a
/// region to a multiplier.
///
/// Writers replace whole policy values under the lock, so readers observe
/// either the previous or the new policy, never a mix.
pub(crate) struct PolicyStore {
    policies: RwLock<HashMap<(Tier, String), RatePolicy>>,
    regions: RwLock<HashMap<String, f64>>,
}

impl PolicyStore {
    pub fn new(
        policies: &BTreeMap<String, BTreeMap<String, PolicyConfig>>,
        regions: &BTreeMap<String, f64>,
    ) -> Self {
        let mut table = HashMap::new();

        for (tier_name, endpoints) in policies {
            let Some(tier) = Tier::from_name(tier_name) else {
                log::warn!("Ignoring policies for unknown tier '{tier_name}'");
                continue;
            };

            if tier == Tier::Unlimited {
                log::warn!("Ignoring policies for the unlimited tier");
                continue;
            }

            for (endpoint, policy) in endpoints {
                table.insert((tier, endpoint.clone()), RatePolicy::from(*policy));
            }
        }

        Self {
            policies: RwLock::new(table),
            regions: RwLock::new(regions.iter().map(|(k, v)| (k.clone(), *v)).collect()),
        }
    }

    fn read_policies(&self) -> RwLockReadGuard<'_, HashMap<(Tier, String), RatePolicy>> {
        self.policies.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the policy for a tier and endpoint. The unlimited tier never
    /// has one; an endpoint without a policy is unrated.
    pub fn policy_for(&self, tier: Tier, endpoint: &str) -> Option<RatePolicy> {
        if tier == Tier::Unlimited {
            return None;
        }

        self.read_policies().get(&(tier, endpoint.to_string())).copied()
    }

    /// Multiplier for a region, falling back to the `DEFAULT` entry.
    pub fn region_multiplier(&self, region: &str) -> f64 {
        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);

        regions
            .get(region)
            .or_else(|| regions.get(DEFAULT_REGION))
            .copied()
            .unwrap_or(1.0)
    }

    /// Install or replace one policy.
    pub fn set_policy(&self, tier: Tier, endpoint: &str, policy: RatePolicy) {
        self.policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((tier, endpoint.to_string()), policy);
    }
}
