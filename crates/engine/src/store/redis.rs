//! Redis-backed shared store executing the token-bucket script atomically.

use std::{future::Future, time::Duration};

use config::RedisConfig;
use redis::Script;

use super::redis_pool::{Manager, Pool, create_pool};
use super::{BucketArgs, BucketKeys, BucketReply, SharedStore, StorageError};

/// Lua script for the atomic refill-admit-persist sequence. The script is
/// the authoritative form of the bucket arithmetic on the shared store.
const TOKEN_BUCKET_SCRIPT: &str = include_str!("redis/token_bucket.lua");

/// Redis-backed shared store implementation.
pub struct RedisStore {
    /// Redis connection pool.
    pool: Pool,
    /// Key prefix for all engine keys.
    key_prefix: String,
    /// Response timeout for Redis commands.
    response_timeout: Duration,
    token_bucket_script: Script,
}

impl RedisStore {
    /// Create a new Redis store instance and verify connectivity.
    pub async fn new(config: &RedisConfig) -> Result<Self, StorageError> {
        let pool = create_pool(config)
            .map_err(|e| StorageError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to ping Redis server: {e}")))?;

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            response_timeout: config.response_timeout.unwrap_or_else(|| Duration::from_secs(1)),
            token_bucket_script: Script::new(TOKEN_BUCKET_SCRIPT),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    async fn conn(&self) -> Result<deadpool::managed::Object<Manager>, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run one Redis command under the configured response timeout. A timed
    /// out command is reported like any other transport failure so the
    /// caller routes onto its degraded path.
    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, StorageError> {
        match tokio::time::timeout(self.response_timeout, fut).await {
            Ok(result) => result.map_err(|e| StorageError::Query(e.to_string())),
            Err(_) => Err(StorageError::Connection(format!(
                "Redis command timed out after {:?}",
                self.response_timeout
            ))),
        }
    }
}

impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn().await?;
        let key = self.prefixed(key);

        self.with_timeout(redis::cmd("GET").arg(&key).query_async::<Option<String>>(&mut *conn))
            .await
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let key = self.prefixed(key);

        // SETEX rejects a zero TTL.
        let ttl = ttl.as_secs().max(1);

        self.with_timeout(
            redis::cmd("SETEX")
                .arg(&key)
                .arg(ttl)
                .arg(value)
                .query_async::<()>(&mut *conn),
        )
        .await
    }

    async fn eval_token_bucket(
        &self,
        keys: &BucketKeys,
        args: BucketArgs,
    ) -> Result<BucketReply, StorageError> {
        let mut conn = self.conn().await?;

        let result: Vec<i64> = self
            .with_timeout(
                self.token_bucket_script
                    .key(self.prefixed(&keys.tokens))
                    .key(self.prefixed(&keys.last_refill))
                    .key(self.prefixed(&keys.count))
                    .arg(args.now)
                    .arg(args.adjusted_max)
                    .arg(args.adjusted_burst)
                    .arg(args.window_secs)
                    .arg(args.cost)
                    .invoke_async(&mut *conn),
            )
            .await?;

        if result.len() != 3 {
            return Err(StorageError::Query(format!(
                "Token bucket script returned {} values, expected 3",
                result.len()
            )));
        }

        Ok(BucketReply {
            allowed: result[0] == 1,
            remaining: result[1].max(0) as u64,
            count: result[2].max(0) as u64,
        })
    }
}
