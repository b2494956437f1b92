//! In-process store for single-instance deployments, doubling as the test
//! stand-in for the fleet-shared store.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use super::{BucketArgs, BucketKeys, BucketReply, SharedStore, StorageError};
use crate::bucket::{self, BucketState};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process shared-store implementation.
///
/// `eval_token_bucket` runs the bucket arithmetic while holding the map
/// lock, giving it the same atomicity as the Redis script. Operation
/// counters and failure switches let callers observe store traffic and
/// drive the degraded paths.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    get_calls: AtomicU64,
    setex_calls: AtomicU64,
    eval_calls: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_evals: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            get_calls: AtomicU64::new(0),
            setex_calls: AtomicU64::new(0),
            eval_calls: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_evals: AtomicBool::new(false),
        }
    }

    /// Number of `get` calls served or failed.
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Number of `setex` calls served or failed.
    pub fn setex_calls(&self) -> u64 {
        self.setex_calls.load(Ordering::Relaxed)
    }

    /// Number of atomic evaluations served or failed.
    pub fn eval_calls(&self) -> u64 {
        self.eval_calls.load(Ordering::Relaxed)
    }

    /// Total store operations of any kind.
    pub fn total_calls(&self) -> u64 {
        self.get_calls() + self.setex_calls() + self.eval_calls()
    }

    /// Make subsequent reads fail, simulating an unreachable store.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent atomic evaluations fail, forcing callers onto the
    /// fallback path.
    pub fn fail_evals(&self, fail: bool) {
        self.fail_evals.store(fail, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_live(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<String> {
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StorageError::Connection("simulated read failure".to_string()));
        }

        let mut entries = self.lock();
        Ok(Self::read_live(&mut entries, key, Instant::now()))
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), StorageError> {
        self.setex_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StorageError::Connection("simulated write failure".to_string()));
        }

        let mut entries = self.lock();

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );

        Ok(())
    }

    async fn eval_token_bucket(
        &self,
        keys: &BucketKeys,
        args: BucketArgs,
    ) -> Result<BucketReply, StorageError> {
        self.eval_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_evals.load(Ordering::Relaxed) {
            return Err(StorageError::Query("simulated script failure".to_string()));
        }

        let mut entries = self.lock();
        let now = Instant::now();

        // Unreadable values reset to their defaults, matching the Lua
        // script's tonumber behavior.
        let state = BucketState {
            tokens: Self::read_live(&mut entries, &keys.tokens, now).and_then(|v| v.parse().ok()),
            last_refill: Self::read_live(&mut entries, &keys.last_refill, now)
                .and_then(|v| v.parse().ok()),
            count: Self::read_live(&mut entries, &keys.count, now).and_then(|v| v.parse().ok()),
        };

        let (reply, write) = bucket::evaluate(state, args);

        let expires_at = now + Duration::from_secs(args.window_secs);

        entries.insert(
            keys.tokens.clone(),
            Entry {
                value: write.tokens.to_string(),
                expires_at,
            },
        );

        entries.insert(
            keys.last_refill.clone(),
            Entry {
                value: write.last_refill.to_string(),
                expires_at,
            },
        );

        entries.insert(
            keys.count.clone(),
            Entry {
                value: write.count.to_string(),
                expires_at,
            },
        );

        Ok(reply)
    }
}
