//! Shared store drivers for bucket state.

use std::time::Duration;

pub mod memory;
pub mod redis;
mod redis_pool;

pub use memory::MemoryStore;

/// The three keys holding one bucket in the shared store. All three share
/// the same TTL of one window; a full idle window evicts the entry and
/// resets the bucket to full.
#[derive(Debug, Clone)]
pub struct BucketKeys {
    /// Fractional tokens left in the bucket.
    pub tokens: String,
    /// Wall-clock second of the last evaluation.
    pub last_refill: String,
    /// Tokens consumed since the entry was created.
    pub count: String,
}

impl BucketKeys {
    /// Keys for one `(identity, endpoint)` bucket.
    pub fn new(identity: &str, endpoint: &str) -> Self {
        Self {
            tokens: format!("bucket:{identity}:{endpoint}:tokens"),
            last_refill: format!("bucket:{identity}:{endpoint}:last_refill"),
            count: format!("bucket:{identity}:{endpoint}:count"),
        }
    }
}

/// Arguments for one atomic bucket evaluation.
#[derive(Debug, Clone, Copy)]
pub struct BucketArgs {
    /// Wall-clock second the evaluation runs at.
    pub now: u64,
    /// Per-window admission ceiling after multipliers.
    pub adjusted_max: u64,
    /// Bucket capacity after multipliers.
    pub adjusted_burst: u64,
    /// Window length in seconds; also the entry TTL.
    pub window_secs: u64,
    /// Tokens the request consumes.
    pub cost: u32,
}

/// Reply from one bucket evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketReply {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Whole tokens left after the operation.
    pub remaining: u64,
    /// Tokens consumed since the entry was created.
    pub count: u64,
}

/// Contract every shared store driver fulfills.
///
/// `eval_token_bucket` is the authoritative atomic primitive: the whole
/// refill-admit-persist sequence observes no interleaving. `get` and `setex`
/// exist for the slow-start marker and the non-atomic fallback path.
#[allow(async_fn_in_trait)]
pub trait SharedStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value with a time-to-live.
    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), StorageError>;

    /// Atomically evaluate one request against a bucket and persist the
    /// outcome.
    async fn eval_token_bucket(
        &self,
        keys: &BucketKeys,
        args: BucketArgs,
    ) -> Result<BucketReply, StorageError>;
}

/// Errors that can occur in store drivers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Internal storage error.
    #[error("Storage error: {0}")]
    Internal(String),
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Query error.
    #[error("Query error: {0}")]
    Query(String),
}
