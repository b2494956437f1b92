//! End-to-end decision scenarios against the in-process store.

use std::{sync::Arc, time::Duration};

use config::EngineConfig;
use engine::{
    AuditEventType, AuditFilter, CheckRequest, MemoryStore, RateLimitEngine, RatePolicy,
    Remaining, Tier,
};

/// Baseline configuration: default policy table, no ramp, no cache, so each
/// call hits the store exactly once.
fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.slow_start.enabled = false;
    config.cache.enabled = false;
    config
}

fn new_engine(config: EngineConfig) -> (RateLimitEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (RateLimitEngine::with_memory_store(&config, store.clone()), store)
}

fn request(identity: &str, endpoint: &str, tier: Tier, region: &str, cost: u32) -> CheckRequest {
    CheckRequest::builder()
        .identity(identity)
        .endpoint(endpoint)
        .tier(tier)
        .region(region)
        .cost(cost)
        .build()
}

#[tokio::test]
async fn burst_exhaustion_denies_past_capacity() {
    let (engine, _) = new_engine(engine_config());

    let mut decisions = Vec::new();

    for _ in 0..25 {
        decisions.push(
            engine
                .check_limit(request("alice", "/api/search", Tier::Free, "US", 1))
                .await,
        );
    }

    for decision in &decisions[..20] {
        assert!(decision.allowed);
        assert_eq!(decision.retry_after_seconds, 0);
    }

    for decision in &decisions[20..] {
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, Remaining::Limited(0));
        assert!(decision.retry_after_seconds >= 1);
    }
}

#[tokio::test]
async fn concurrent_burst_consumes_each_token_once() {
    let (engine, _) = new_engine(engine_config());
    let engine = Arc::new(engine);

    let mut tasks = tokio::task::JoinSet::new();

    for _ in 0..50 {
        let engine = engine.clone();

        tasks.spawn(async move {
            engine
                .check_limit(request("bob", "/api/search", Tier::Premium, "US", 1))
                .await
        });
    }

    let mut remaining = Vec::new();

    while let Some(result) = tasks.join_next().await {
        let decision = result.unwrap();
        assert!(decision.allowed);

        match decision.remaining {
            Remaining::Limited(tokens) => remaining.push(tokens),
            Remaining::Unlimited => panic!("expected a bounded decision"),
        }
    }

    // Premium search has a burst of 100: fifty concurrent admissions leave
    // every value from 50 to 99 observed exactly once.
    remaining.sort_unstable();
    assert_eq!(remaining, (50..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn region_multiplier_tightens_checkout() {
    let (engine, _) = new_engine(engine_config());

    let first = engine
        .check_limit(request("carol", "/api/checkout", Tier::Premium, "CN", 5))
        .await;
    assert!(first.allowed);
    assert_eq!(first.remaining, Remaining::Limited(5));

    let second = engine
        .check_limit(request("carol", "/api/checkout", Tier::Premium, "CN", 5))
        .await;
    assert!(second.allowed);
    assert_eq!(second.remaining, Remaining::Limited(0));

    let third = engine
        .check_limit(request("carol", "/api/checkout", Tier::Premium, "CN", 5))
        .await;
    assert!(!third.allowed);
    assert!(third.retry_after_seconds >= 1);
}

#[tokio::test]
async fn unlimited_tier_bypasses_the_store() {
    let (engine, store) = new_engine(engine_config());

    for i in 0..1000u32 {
        let identity = format!("svc-{}", i % 10);

        let decision = engine
            .check_limit(request(&identity, "/api/search", Tier::Unlimited, "US", 1))
            .await;

        assert!(decision.allowed);
        assert_eq!(decision.remaining, Remaining::Unlimited);
        assert_eq!(decision.retry_after_seconds, 0);
    }

    assert_eq!(store.total_calls(), 0);

    let report = engine.analytics_report();
    assert_eq!(report.total, 1000);
    assert_eq!(report.total_denied, 0);
}

#[tokio::test]
async fn slow_start_clamps_new_identities() {
    let mut config = engine_config();
    config.slow_start.enabled = true;
    config.slow_start.duration = Duration::from_secs(60);

    let (engine, _) = new_engine(config);

    let mut allowed = 0;
    let mut denied = 0;

    for _ in 0..10 {
        let decision = engine
            .check_limit(request("dave", "/api/search", Tier::Free, "US", 1))
            .await;

        if decision.allowed {
            allowed += 1;
        } else {
            denied += 1;
        }
    }

    // Stage zero scales the burst of 20 down to 6.
    assert_eq!(allowed, 6);
    assert_eq!(denied, 4);

    let new_users = engine.audit_log(&AuditFilter {
        event_type: Some(AuditEventType::NewUser),
        ..Default::default()
    });
    assert_eq!(new_users.len(), 1);
    assert_eq!(new_users[0].identity, "dave");

    let denials = engine.audit_log(&AuditFilter {
        event_type: Some(AuditEventType::RateLimitExceeded),
        ..Default::default()
    });
    assert_eq!(denials.len(), 4);
}

#[tokio::test]
async fn cache_collapses_identical_calls() {
    let mut config = engine_config();
    config.cache.enabled = true;

    let (engine, store) = new_engine(config);

    let first = engine
        .check_limit(request("erin", "/api/search", Tier::Premium, "US", 1))
        .await;
    assert!(first.allowed);

    for _ in 0..49 {
        let decision = engine
            .check_limit(request("erin", "/api/search", Tier::Premium, "US", 1))
            .await;

        assert_eq!(decision, first);
    }

    assert_eq!(store.eval_calls(), 1);

    // Every decision counts, cached or not.
    assert_eq!(engine.analytics_report().total, 50);
}

#[tokio::test]
async fn cache_clear_forces_fresh_evaluation() {
    let mut config = engine_config();
    config.cache.enabled = true;

    let (engine, store) = new_engine(config);

    assert!(
        engine
            .check_limit(request("mallory", "/api/search", Tier::Premium, "US", 1))
            .await
            .allowed
    );
    assert!(
        engine
            .check_limit(request("mallory", "/api/search", Tier::Premium, "US", 1))
            .await
            .allowed
    );
    assert_eq!(store.eval_calls(), 1);

    engine.clear_cache_for("mallory");

    assert!(
        engine
            .check_limit(request("mallory", "/api/search", Tier::Premium, "US", 1))
            .await
            .allowed
    );
    assert_eq!(store.eval_calls(), 2);
}

#[tokio::test]
async fn unknown_endpoint_is_unrated() {
    let (engine, store) = new_engine(engine_config());

    let decision = engine
        .check_limit(request("frank", "/api/uncharted", Tier::Free, "US", 1))
        .await;

    assert!(decision.allowed);
    assert_eq!(decision.remaining, Remaining::Unlimited);
    assert_eq!(store.total_calls(), 0);
    assert!(engine.analytics_report().buckets.is_empty());
}

#[tokio::test]
async fn unknown_region_uses_default_multiplier() {
    let (engine, _) = new_engine(engine_config());

    // DEFAULT is 1.0, so the full free-tier burst of 20 is available.
    for _ in 0..20 {
        assert!(
            engine
                .check_limit(request("grace", "/api/search", Tier::Free, "AQ", 1))
                .await
                .allowed
        );
    }

    assert!(
        !engine
            .check_limit(request("grace", "/api/search", Tier::Free, "AQ", 1))
            .await
            .allowed
    );
}

#[tokio::test]
async fn oversized_cost_is_never_admitted() {
    let (engine, _) = new_engine(engine_config());

    // Free checkout has a burst of 2; a cost of 5 can never fit.
    for _ in 0..3 {
        let decision = engine
            .check_limit(request("heidi", "/api/checkout", Tier::Free, "US", 5))
            .await;

        assert!(!decision.allowed);
        assert!(decision.retry_after_seconds >= 1);

        match decision.remaining {
            Remaining::Limited(tokens) => assert!(tokens <= 2),
            Remaining::Unlimited => panic!("expected a bounded decision"),
        }
    }
}

#[tokio::test]
async fn fallback_enforces_when_atomic_path_fails() {
    let (engine, store) = new_engine(engine_config());
    store.fail_evals(true);

    for _ in 0..2 {
        assert!(
            engine
                .check_limit(request("ivan", "/api/checkout", Tier::Free, "US", 1))
                .await
                .allowed
        );
    }

    let denied = engine
        .check_limit(request("ivan", "/api/checkout", Tier::Free, "US", 1))
        .await;

    assert!(!denied.allowed);
    assert!(denied.retry_after_seconds >= 1);

    let denials = engine.audit_log(&AuditFilter {
        event_type: Some(AuditEventType::RateLimitExceeded),
        ..Default::default()
    });
    assert_eq!(denials.len(), 1);
}

#[tokio::test]
async fn total_outage_fails_open() {
    let (engine, store) = new_engine(engine_config());
    store.fail_evals(true);
    store.fail_reads(true);

    let decision = engine
        .check_limit(request("judy", "/api/search", Tier::Free, "US", 1))
        .await;

    assert!(decision.allowed);
    assert_eq!(decision.remaining, Remaining::Unlimited);
    assert_eq!(decision.retry_after_seconds, 0);
}

#[tokio::test]
async fn intermittent_store_failures_keep_admitting() {
    let (engine, store) = new_engine(engine_config());

    let mut allowed = 0;

    for i in 0..100 {
        store.fail_evals(i % 10 == 0);

        let decision = engine
            .check_limit(request("kate", "/api/search", Tier::Enterprise, "US", 1))
            .await;

        if decision.allowed {
            allowed += 1;
        }
    }

    // The fallback path keeps enforcing from the same bucket state, and the
    // enterprise burst of 1000 covers all of it.
    assert_eq!(allowed, 100);
}

#[tokio::test]
async fn runtime_policy_changes_take_effect() {
    let (engine, _) = new_engine(engine_config());

    engine.set_policy(
        Tier::Free,
        "/api/export",
        RatePolicy {
            max: 5,
            burst: 1,
            window: Duration::from_secs(60),
        },
    );

    assert!(
        engine
            .check_limit(request("lena", "/api/export", Tier::Free, "US", 1))
            .await
            .allowed
    );
    assert!(
        !engine
            .check_limit(request("lena", "/api/export", Tier::Free, "US", 1))
            .await
            .allowed
    );

    let changes = engine.audit_log(&AuditFilter {
        event_type: Some(AuditEventType::ConfigurationChange),
        ..Default::default()
    });
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].endpoint, "/api/export");
}

#[tokio::test]
async fn analytics_track_allowed_and_denied() {
    let (engine, _) = new_engine(engine_config());

    // Free checkout bursts at 2: two admits, then a denial.
    for _ in 0..3 {
        engine
            .check_limit(request("nick", "/api/checkout", Tier::Free, "US", 1))
            .await;
    }

    let report = engine.analytics_report();

    assert_eq!(report.total, 3);
    assert_eq!(report.total_allowed, 2);
    assert_eq!(report.total_denied, 1);

    let bucket = &report.buckets[0];
    assert_eq!(bucket.endpoint, "/api/checkout");
    assert_eq!(bucket.tier, Tier::Free);
    assert_eq!(bucket.region, "US");
    assert!((bucket.allow_rate - 2.0 / 3.0).abs() < 1e-9);
}
