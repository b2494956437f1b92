//! The decision orchestrator tying the engine's parts together.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use config::{EngineConfig, StorageConfig};

use crate::analytics::{AnalyticsRecorder, AnalyticsReport};
use crate::audit::{AuditEvent, AuditEventType, AuditFilter, AuditLog};
use crate::cache::DecisionCache;
use crate::decision::{Decision, Remaining};
use crate::error::EngineError;
use crate::fallback::{self, FallbackOutcome};
use crate::policy::{PolicyStore, RatePolicy};
use crate::request::{CheckRequest, Tier};
use crate::slow_start::SlowStartController;
use crate::store::redis::RedisStore;
use crate::store::{
    BucketArgs, BucketKeys, BucketReply, MemoryStore, SharedStore, StorageError,
};

/// Storage backend the engine runs against.
enum Storage {
    Memory(Arc<MemoryStore>),
    Redis(RedisStore),
}

impl SharedStore for Storage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self {
            Storage::Memory(store) => store.get(key).await,
            Storage::Redis(store) => store.get(key).await,
        }
    }

    async fn setex(
        &self,
        key: &str,
        ttl: std::time::Duration,
        value: &str,
    ) -> Result<(), StorageError> {
        match self {
            Storage::Memory(store) => store.setex(key, ttl, value).await,
            Storage::Redis(store) => store.setex(key, ttl, value).await,
        }
    }

    async fn eval_token_bucket(
        &self,
        keys: &BucketKeys,
        args: BucketArgs,
    ) -> Result<BucketReply, StorageError> {
        match self {
            Storage::Memory(store) => store.eval_token_bucket(keys, args).await,
            Storage::Redis(store) => store.eval_token_bucket(keys, args).await,
        }
    }
}

/// The rate-limit decision engine.
///
/// One instance serves a whole process. Instances on different frontends
/// converge through the shared store; everything else they hold (policies,
/// cache, analytics, audit history) is process-local.
pub struct RateLimitEngine {
    policies: PolicyStore,
    storage: Storage,
    cache: DecisionCache,
    slow_start: SlowStartController,
    analytics: AnalyticsRecorder,
    audit: AuditLog,
}

impl RateLimitEngine {
    /// Create an engine with the configured storage backend.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let storage = match &config.storage {
            StorageConfig::Memory => Storage::Memory(Arc::new(MemoryStore::new())),
            StorageConfig::Redis(redis_config) => {
                Storage::Redis(RedisStore::new(redis_config).await?)
            }
        };

        Ok(Self::with_storage(&config, storage))
    }

    /// Create an engine on an existing in-process store, so the caller can
    /// observe store traffic from outside.
    pub fn with_memory_store(config: &EngineConfig, store: Arc<MemoryStore>) -> Self {
        Self::with_storage(config, Storage::Memory(store))
    }

    fn with_storage(config: &EngineConfig, storage: Storage) -> Self {
        Self {
            policies: PolicyStore::new(&config.policies, &config.regions),
            storage,
            cache: DecisionCache::new(&config.cache),
            slow_start: SlowStartController::new(&config.slow_start),
            analytics: AnalyticsRecorder::default(),
            audit: AuditLog::new(&config.audit),
        }
    }

    /// Decide whether one request is admitted, and if not, when the caller
    /// may retry.
    ///
    /// This never fails: every internal error degrades to an unbounded
    /// allow, trading enforcement for availability.
    pub async fn check_limit(&self, request: CheckRequest) -> Decision {
        match self.try_check(&request).await {
            Ok(decision) => decision,
            Err(e) => {
                log::error!(
                    "Rate limit check failed for {} on {}, failing open: {e}",
                    request.identity,
                    request.endpoint
                );

                self.analytics
                    .record(&request.endpoint, request.tier, &request.region, true);

                Decision::unbounded_allow(request.cost)
            }
        }
    }

    async fn try_check(&self, request: &CheckRequest) -> Result<Decision, EngineError> {
        // Unlimited tier: no store, no cache, still counted.
        if request.tier == Tier::Unlimited {
            self.analytics
                .record(&request.endpoint, request.tier, &request.region, true);

            return Ok(Decision::unbounded_allow(request.cost));
        }

        // No policy for this (tier, endpoint) means the endpoint is unrated.
        let Some(policy) = self.policies.policy_for(request.tier, &request.endpoint) else {
            return Ok(Decision::unbounded_allow(request.cost));
        };

        let cache_key = DecisionCache::key(&request.identity, &request.endpoint, request.tier);

        if let Some(decision) = self.cache.lookup(&cache_key) {
            self.analytics
                .record(&request.endpoint, request.tier, &request.region, decision.allowed);

            return Ok(decision);
        }

        let now = unix_now();

        let slow_start = self
            .slow_start
            .multiplier(&self.storage, &request.identity, &request.endpoint, now)
            .await;

        if slow_start.newly_seen {
            self.audit
                .append(self.event(AuditEventType::NewUser, request, now, None));
        }

        let multiplier = self.policies.region_multiplier(&request.region) * slow_start.multiplier;

        let adjusted_max = (policy.max as f64 * multiplier).floor() as u64;
        let adjusted_burst = (policy.burst as f64 * multiplier).floor() as u64;
        let window_secs = policy.window.as_secs();

        let keys = BucketKeys::new(&request.identity, &request.endpoint);

        let args = BucketArgs {
            now,
            adjusted_max,
            adjusted_burst,
            window_secs,
            cost: request.cost,
        };

        let reply = match self.storage.eval_token_bucket(&keys, args).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!(
                    "Atomic bucket evaluation failed for {} on {}, using fallback: {e}",
                    request.identity,
                    request.endpoint
                );

                match fallback::evaluate(&self.storage, &keys, args).await {
                    FallbackOutcome::Evaluated(reply) => reply,
                    FallbackOutcome::FailOpen => {
                        self.analytics
                            .record(&request.endpoint, request.tier, &request.region, true);

                        return Ok(Decision::unbounded_allow(request.cost));
                    }
                }
            }
        };

        let decision = if reply.allowed {
            let decision = Decision {
                allowed: true,
                remaining: Remaining::Limited(reply.remaining),
                retry_after_seconds: 0,
                cost: request.cost,
            };

            self.cache.store(cache_key, &decision);
            decision
        } else {
            Decision {
                allowed: false,
                remaining: Remaining::Limited(reply.remaining),
                retry_after_seconds: retry_after_seconds(window_secs, adjusted_max, &reply, request.cost),
                cost: request.cost,
            }
        };

        self.analytics
            .record(&request.endpoint, request.tier, &request.region, decision.allowed);

        if !decision.allowed {
            self.audit
                .append(self.event(AuditEventType::RateLimitExceeded, request, now, None));
        }

        Ok(decision)
    }

    /// Snapshot of the analytics counters.
    pub fn analytics_report(&self) -> AnalyticsReport {
        self.analytics.report()
    }

    /// Copy of the audit history matching the filter, oldest first.
    pub fn audit_log(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        self.audit.query(filter)
    }

    /// Install or replace the policy for a `(tier, endpoint)` pair.
    ///
    /// The unlimited tier cannot carry policies; such writes are ignored.
    pub fn set_policy(&self, tier: Tier, endpoint: &str, policy: RatePolicy) {
        if tier == Tier::Unlimited {
            log::warn!("Ignoring policy for the unlimited tier on {endpoint}");
            return;
        }

        self.policies.set_policy(tier, endpoint, policy);

        self.audit.append(AuditEvent {
            timestamp: unix_now(),
            event_type: AuditEventType::ConfigurationChange,
            identity: "system".to_string(),
            endpoint: endpoint.to_string(),
            tier,
            region: "global".to_string(),
            detail: Some(format!(
                "max={} burst={} window={}s",
                policy.max,
                policy.burst,
                policy.window.as_secs()
            )),
        });
    }

    /// Drop cached decisions for an identity, e.g. after a tier
    /// reassignment.
    pub fn clear_cache_for(&self, identity: &str) {
        self.cache.clear_for(identity);
    }

    fn event(
        &self,
        event_type: AuditEventType,
        request: &CheckRequest,
        timestamp: u64,
        detail: Option<String>,
    ) -> AuditEvent {
        AuditEvent {
            timestamp,
            event_type,
            identity: request.identity.clone(),
            endpoint: request.endpoint.clone(),
            tier: request.tier,
            region: request.region.clone(),
            detail,
        }
    }
}

/// Seconds until a denied request could plausibly be admitted.
///
/// With the per-window ceiling exhausted (or adjusted down to zero) nothing
/// refills the budget before the entry expires, so the caller waits a full
/// window. Otherwise the wait covers the token deficit at the refill rate.
fn retry_after_seconds(window_secs: u64, adjusted_max: u64, reply: &BucketReply, cost: u32) -> u64 {
    if adjusted_max == 0 || reply.count >= adjusted_max {
        return window_secs;
    }

    let deficit = f64::from(cost) - reply.remaining as f64;
    let seconds_per_token = window_secs as f64 / adjusted_max as f64;

    ((deficit * seconds_per_token).ceil() as u64).max(1)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
