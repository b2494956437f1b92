//! Bounded in-memory audit log of security events.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use config::AuditConfig;
use serde::{Deserialize, Serialize};

use crate::request::Tier;

/// Kind of a recorded security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// An identity was observed for the first time.
    NewUser,
    /// A request was denied by the bucket evaluation.
    RateLimitExceeded,
    /// A rate-limit policy was changed at runtime.
    ConfigurationChange,
}

/// One recorded security event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    /// Wall-clock second the event was recorded at.
    pub timestamp: u64,
    /// Kind of event.
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    /// Identity the event concerns.
    pub identity: String,
    /// Endpoint involved.
    pub endpoint: String,
    /// Tier of the identity at the time of the event.
    pub tier: Tier,
    /// Region of the request.
    pub region: String,
    /// Free-form context, such as the new policy values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Filters applied by an audit query; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only events for this identity.
    pub identity: Option<String>,
    /// Only events of this kind.
    pub event_type: Option<AuditEventType>,
    /// Only events recorded at or after this wall-clock second.
    pub since: Option<u64>,
}

/// Bounded ring of security events with FIFO eviction.
pub(crate) struct AuditLog {
    enabled: bool,
    max_events: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl AuditLog {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_events: config.max_events.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one event; a no-op while disabled.
    pub fn append(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }

        let mut events = self.lock();

        while events.len() >= self.max_events {
            events.pop_front();
        }

        events.push_back(event);
    }

    /// Copy of the recorded history matching the filter, oldest first.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        self.lock()
            .iter()
            .filter(|event| {
                filter
                    .identity
                    .as_deref()
                    .is_none_or(|identity| event.identity == identity)
                    && filter.event_type.is_none_or(|t| event.event_type == t)
                    && filter.since.is_none_or(|since| event.timestamp >= since)
            })
            .cloned()
            .collect()
    }
}
