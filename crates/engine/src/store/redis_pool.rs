//! Deadpool-managed Redis connections for the shared store.

use std::sync::atomic::{AtomicUsize, Ordering};

use config::RedisConfig;
use deadpool::managed::{self, Metrics, RecycleError};
use redis::{Client, RedisError, RedisResult, aio::MultiplexedConnection};

/// Redis connection pool.
pub type Pool = deadpool::managed::Pool<Manager>;

/// Creates and health-checks pooled Redis connections.
#[derive(Debug)]
pub struct Manager {
    client: Client,
    recycle_counter: AtomicUsize,
}

impl Manager {
    /// Create a new pool manager for the configured Redis endpoint.
    pub fn new(config: &RedisConfig) -> RedisResult<Self> {
        Ok(Self {
            client: Client::open(config.url.as_str())?,
            recycle_counter: AtomicUsize::new(0),
        })
    }
}

impl managed::Manager for Manager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, Self::Error> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(
        &self,
        conn: &mut MultiplexedConnection,
        _: &Metrics,
    ) -> managed::RecycleResult<Self::Error> {
        // A connection handed back mid-transaction may still hold a WATCH.
        redis::cmd("UNWATCH").query_async::<()>(conn).await?;

        // Ping with a unique token so a desynchronized connection cannot
        // answer with a stale reply.
        let token = self
            .recycle_counter
            .fetch_add(1, Ordering::Relaxed)
            .to_string();

        let echo: String = redis::cmd("PING").arg(&token).query_async(conn).await?;

        if echo != token {
            return Err(RecycleError::message("PING echo mismatch on recycle"));
        }

        Ok(())
    }
}

/// Create a Redis connection pool from configuration.
pub fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let manager = Manager::new(config)?;

    let mut builder = Pool::builder(manager)
        .create_timeout(config.pool.timeout_create)
        .wait_timeout(config.pool.timeout_wait)
        .recycle_timeout(config.pool.timeout_recycle)
        .runtime(deadpool::Runtime::Tokio1);

    if let Some(max_size) = config.pool.max_size {
        builder = builder.max_size(max_size);
    }

    builder.build().map_err(|e| {
        RedisError::from((
            redis::ErrorKind::IoError,
            "Redis pool construction failed",
            e.to_string(),
        ))
    })
}
