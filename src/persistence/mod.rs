//! Shared coordination state: dedup markers and rate-limit counters.
//!
//! The backend is picked from the configured `database_url`: `redis://`
//! and `rediss://` URLs select Redis, which coordinates workers on any
//! number of hosts; anything else is opened as a SQLite database, which
//! coordinates the workers of a single host.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod sqlite;
pub mod traits;

use std::sync::Arc;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sqlite::SqliteStore;
pub use traits::SharedStore;

/// An opened store backend.
#[derive(Clone)]
pub enum StoreBackend {
    /// A SQLite file shared by the workers of one host.
    Sqlite(Arc<SqliteStore>),
    /// A Redis server shared by workers on any host.
    Redis(Arc<RedisStore>),
}

impl StoreBackend {
    /// Opens the backend `url` points at. SQLite migrations are applied.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        if RedisStore::accepts(url) {
            return Ok(Self::Redis(Arc::new(RedisStore::new(url).await?)));
        }
        let sqlite = SqliteStore::new(url).await?;
        sqlite.run_migrations().await?;
        Ok(Self::Sqlite(Arc::new(sqlite)))
    }

    /// The backend as the trait object the pipeline works with.
    pub fn shared(&self) -> Arc<dyn SharedStore> {
        match self {
            Self::Sqlite(store) => Arc::clone(store) as Arc<dyn SharedStore>,
            Self::Redis(store) => Arc::clone(store) as Arc<dyn SharedStore>,
        }
    }

    /// The SQLite handle, which needs periodic purging and an explicit close.
    pub fn sqlite(&self) -> Option<Arc<SqliteStore>> {
        match self {
            Self::Sqlite(store) => Some(Arc::clone(store)),
            Self::Redis(_) => None,
        }
    }

    /// Short backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Redis(_) => "redis",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_sqlite_url_opens_migrated_sqlite_backend() {
        let backend = StoreBackend::connect("sqlite::memory:").await.unwrap();
        assert_eq!(backend.kind(), "sqlite");
        assert!(backend.sqlite().is_some());
        assert!(backend.shared().conditional_create("k", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_redis_url_selects_redis_backend() {
        // Nothing listens on port 1, so the Redis backend fails to connect
        // instead of falling back to SQLite.
        let result = StoreBackend::connect("redis://127.0.0.1:1/0").await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
