//! Operational endpoints: analytics, audit history, runtime policy changes.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, put},
};
use engine::{
    AnalyticsReport, AuditEvent, AuditEventType, AuditFilter, RateLimitEngine, RatePolicy, Tier,
};
use http::StatusCode;
use serde::Deserialize;

pub(crate) fn router() -> Router<Arc<RateLimitEngine>> {
    Router::new()
        .route("/analytics", get(analytics))
        .route("/audit-log", get(audit_log))
        .route("/policies/{tier}/{*endpoint}", put(set_policy))
        .route("/cache/{identity}", delete(clear_cache))
}

async fn analytics(State(engine): State<Arc<RateLimitEngine>>) -> Json<AnalyticsReport> {
    Json(engine.analytics_report())
}

#[derive(Debug, Default, Deserialize)]
struct AuditQuery {
    identity: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<AuditEventType>,
    since: Option<u64>,
}

async fn audit_log(
    State(engine): State<Arc<RateLimitEngine>>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEvent>> {
    let filter = AuditFilter {
        identity: query.identity,
        event_type: query.event_type,
        since: query.since,
    };

    Json(engine.audit_log(&filter))
}

#[derive(Debug, Deserialize)]
struct PolicyBody {
    max: u64,
    burst: u64,
    window_seconds: u64,
}

async fn set_policy(
    State(engine): State<Arc<RateLimitEngine>>,
    Path((tier, endpoint)): Path<(String, String)>,
    Json(body): Json<PolicyBody>,
) -> StatusCode {
    let Some(tier) = Tier::from_name(&tier) else {
        return StatusCode::NOT_FOUND;
    };

    if tier == Tier::Unlimited || body.max == 0 || body.burst == 0 || body.window_seconds == 0 {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }

    // The wildcard capture drops the leading slash.
    let endpoint = format!("/{endpoint}");

    engine.set_policy(
        tier,
        &endpoint,
        RatePolicy {
            max: body.max,
            burst: body.burst,
            window: Duration::from_secs(body.window_seconds),
        },
    );

    StatusCode::NO_CONTENT
}

async fn clear_cache(
    State(engine): State<Arc<RateLimitEngine>>,
    Path(identity): Path<String>,
) -> StatusCode {
    engine.clear_cache_for(&identity);
    StatusCode::NO_CONTENT
}
