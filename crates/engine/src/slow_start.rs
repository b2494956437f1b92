//! Slow-start ramp for newly seen identities.

use std::time::Duration;

use config::SlowStartConfig;

use crate::store::SharedStore;

/// Multiplier produced for one call, plus whether the identity was observed
/// for the first time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SlowStartOutcome {
    pub multiplier: f64,
    pub newly_seen: bool,
}

const PASS_THROUGH: SlowStartOutcome = SlowStartOutcome {
    multiplier: 1.0,
    newly_seen: false,
};

/// Tracks the first-seen time per `(identity, endpoint)` and produces a
/// ramp multiplier that grows through the configured stages.
///
/// The marker's TTL equals the ramp duration: an identity dormant longer
/// than the ramp re-enters stage zero.
pub(crate) struct SlowStartController {
    enabled: bool,
    duration_secs: u64,
    stages: Vec<f64>,
}

impl SlowStartController {
    pub fn new(config: &SlowStartConfig) -> Self {
        let stages = if config.stages.is_empty() {
            vec![0.3, 0.6, 1.0]
        } else {
            config.stages.clone()
        };

        Self {
            enabled: config.enabled,
            duration_secs: config.duration.as_secs(),
            stages,
        }
    }

    fn marker_key(identity: &str, endpoint: &str) -> String {
        format!("slowstart:{identity}:{endpoint}")
    }

    /// Resolve the ramp multiplier, creating the first-seen marker when the
    /// identity is new. Store failures degrade to a multiplier of 1.0: the
    /// ramp fails open without taking the whole decision path with it.
    pub async fn multiplier<S: SharedStore>(
        &self,
        store: &S,
        identity: &str,
        endpoint: &str,
        now: u64,
    ) -> SlowStartOutcome {
        if !self.enabled {
            return PASS_THROUGH;
        }

        let key = Self::marker_key(identity, endpoint);

        let stored = match store.get(&key).await {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Slow-start marker read failed, skipping ramp: {e}");
                return PASS_THROUGH;
            }
        };

        match stored {
            None => {
                let ttl = Duration::from_secs(self.duration_secs);

                if let Err(e) = store.setex(&key, ttl, &now.to_string()).await {
                    log::warn!("Slow-start marker write failed, skipping ramp: {e}");
                    return PASS_THROUGH;
                }

                SlowStartOutcome {
                    multiplier: self.stages[0],
                    newly_seen: true,
                }
            }
            Some(value) => {
                let Ok(first_seen) = value.parse::<u64>() else {
                    log::warn!("Slow-start marker {key} is unreadable, skipping ramp");
                    return PASS_THROUGH;
                };

                SlowStartOutcome {
                    multiplier: self.stage_multiplier(now.saturating_sub(first_seen)),
                    newly_seen: false,
                }
            }
        }
    }

    /// Stage for a given identity age: the ramp is split into equal-length
    /// stages, clamping at the last one.
    fn stage_multiplier(&self, age_secs: u64) -> f64 {
        let stage_length = self.duration_secs as f64 / self.stages.len() as f64;

        let index = if stage_length > 0.0 {
            ((age_secs as f64 / stage_length) as usize).min(self.stages.len() - 1)
        } else {
            self.stages.len() - 1
        };

        self.stages[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn controller(duration_secs: u64) -> SlowStartController {
        SlowStartController::new(&SlowStartConfig {
            enabled: true,
            duration: Duration::from_secs(duration_secs),
            stages: vec![0.3, 0.6, 1.0],
        })
    }

    #[tokio::test]
    async fn first_sighting_creates_marker_at_stage_zero() {
        let store = MemoryStore::new();
        let controller = controller(60);

        let outcome = controller.multiplier(&store, "alice", "/api/search", 1000).await;

        assert_eq!(outcome.multiplier, 0.3);
        assert!(outcome.newly_seen);

        let marker = store.get("slowstart:alice:/api/search").await.unwrap();
        assert_eq!(marker, Some("1000".to_string()));
    }

    #[tokio::test]
    async fn second_sighting_is_not_new() {
        let store = MemoryStore::new();
        let controller = controller(60);

        controller.multiplier(&store, "alice", "/api/search", 1000).await;
        let outcome = controller.multiplier(&store, "alice", "/api/search", 1005).await;

        assert_eq!(outcome.multiplier, 0.3);
        assert!(!outcome.newly_seen);
    }

    #[tokio::test]
    async fn stages_progress_with_identity_age() {
        let store = MemoryStore::new();
        let controller = controller(60);

        // Marker planted 25 seconds ago: stage length is 20, so stage 1.
        store
            .setex("slowstart:alice:/api/search", Duration::from_secs(60), "975")
            .await
            .unwrap();

        let outcome = controller.multiplier(&store, "alice", "/api/search", 1000).await;
        assert_eq!(outcome.multiplier, 0.6);

        // Ages past the ramp clamp at the last stage.
        let outcome = controller.multiplier(&store, "alice", "/api/search", 10_000).await;
        assert_eq!(outcome.multiplier, 1.0);
    }

    #[tokio::test]
    async fn store_failure_fails_open_to_full_multiplier() {
        let store = MemoryStore::new();
        store.fail_reads(true);

        let outcome = controller(60).multiplier(&store, "alice", "/api/search", 1000).await;

        assert_eq!(outcome.multiplier, 1.0);
        assert!(!outcome.newly_seen);
    }

    #[tokio::test]
    async fn disabled_controller_passes_through() {
        let store = MemoryStore::new();

        let controller = SlowStartController::new(&SlowStartConfig {
            enabled: false,
            duration: Duration::from_secs(60),
            stages: vec![0.3, 0.6, 1.0],
        });

        let outcome = controller.multiplier(&store, "alice", "/api/search", 1000).await;

        assert_eq!(outcome, PASS_THROUGH);
        assert_eq!(store.total_calls(), 0);
    }
}
