//! Distributed rate-limit decision engine for Tollgate.
//!
//! For every incoming request the engine answers one question in bounded
//! time: should this request be admitted, and if not, when may the caller
//! retry? The answer stays consistent across a fleet of stateless frontends
//! sharing a single external key-value store.
//!
//! The decision path combines:
//! - token-bucket accounting executed atomically against the shared store
//! - a short-TTL local cache collapsing bursts of identical calls
//! - an unlimited-tier bypass
//! - cost-weighted admission with per-tier, per-region and slow-start
//!   adjustments
//! - a non-atomic fallback path for when the shared store is degraded
//! - in-memory analytics counters and a bounded audit log

#![deny(missing_docs)]

mod analytics;
mod audit;
mod bucket;
mod cache;
mod decision;
mod engine;
mod error;
mod fallback;
mod policy;
mod request;
mod slow_start;
mod store;

pub use analytics::{AnalyticsBucket, AnalyticsReport};
pub use audit::{AuditEvent, AuditEventType, AuditFilter};
pub use decision::{Decision, Remaining};
pub use engine::RateLimitEngine;
pub use error::EngineError;
pub use policy::RatePolicy;
pub use request::{CheckRequest, CheckRequestBuilder, Tier};
pub use store::{
    BucketArgs, BucketKeys, BucketReply, MemoryStore, SharedStore, StorageError,
};
