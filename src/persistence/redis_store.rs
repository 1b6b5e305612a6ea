//! A `SharedStore` on Redis, for workers spread over several hosts.
//!
//! Expiry is delegated to Redis itself, so no maintenance pass is needed.
//! Every command runs under a response timeout so that a stalled server
//! surfaces as `StoreError::Unavailable` and the pipeline can fail open.

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, RedisError, Script, aio::ConnectionManager};

use super::{error::StoreError, traits::SharedStore};

/// Upper bound for connecting and for a single command round trip.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Increments a counter and arms its expiry when the counter has none,
/// which is the case right after the first increment of a window.
const INCREMENT_WITH_EXPIRY: &str = r#"
local value = redis.call('INCR', KEYS[1])
if redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return value
"#;

/// A `SharedStore` implementation on Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    increment: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the server at `url` (`redis://` or `rediss://`). The
    /// connection is re-established automatically after it drops.
    #[tracing::instrument(level = "info", skip(url))]
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        let connection = tokio::time::timeout(RESPONSE_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Unavailable("timed out connecting to Redis".to_string()))?
            .map_err(map_redis_error)?;
        tracing::info!("Successfully connected to Redis store.");
        Ok(Self { connection, increment: Script::new(INCREMENT_WITH_EXPIRY) })
    }

    /// Returns `true` for URLs this backend handles.
    pub fn accepts(url: &str) -> bool {
        url.starts_with("redis://") || url.starts_with("rediss://")
    }

    async fn with_timeout<T, F>(&self, operation: &str, query: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(RESPONSE_TIMEOUT, query).await {
            Ok(result) => result.map_err(|e| {
                tracing::error!(error = %e, operation = %operation, "Store operation failed.");
                map_redis_error(e)
            }),
            Err(_) => {
                tracing::error!(operation = %operation, "Store operation timed out.");
                Err(StoreError::Unavailable(format!("{operation} timed out")))
            }
        }
    }
}

/// Milliseconds for `PX`/`PEXPIRE`, which reject zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
    {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::OperationFailed(e.to_string())
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn conditional_create(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = self
            .with_timeout(
                "conditional create",
                redis::cmd("SET")
                    .arg(key)
                    .arg(1)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async(&mut connection),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let mut connection = self.connection.clone();
        self.with_timeout(
            "increment with expiry",
            self.increment.key(key).arg(ttl_millis(window)).invoke_async(&mut connection),
        )
        .await
    }

    async fn get_counter(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut connection = self.connection.clone();
        self.with_timeout("get counter", redis::cmd("GET").arg(key).query_async(&mut connection))
            .await
    }
}
