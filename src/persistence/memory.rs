//! A process-local `SharedStore` on top of `DashMap`.
//!
//! Only coordinates callers inside one process. Expiry is measured with
//! tokio's clock, so tests can drive it with `tokio::time::pause`/`advance`.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

use super::{error::StoreError, traits::SharedStore};

#[derive(Debug, Clone, Copy)]
struct Record {
    value: u64,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory store for single-worker deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Record>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired records and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| record.is_live(now));
        before - self.records.len()
    }

    /// Number of records currently held, live or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn conditional_create(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock, so check-and-set is atomic.
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(Record { value: 1, expires_at: now + ttl });
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Record { value: 1, expires_at: now + ttl });
                Ok(true)
            }
        }
    }

    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert(Record { value: 0, expires_at: now + window });
        if !record.is_live(now) {
            *record = Record { value: 0, expires_at: now + window };
        }
        record.value += 1;
        Ok(record.value)
    }

    async fn get_counter(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        Ok(self.records.get(key).filter(|record| record.is_live(now)).map(|record| record.value))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_conditional_create_respects_ttl() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.conditional_create("k", ttl).await.unwrap());
        assert!(!store.conditional_create("k", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!store.conditional_create("k", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.conditional_create("k", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_does_not_extend_expiry() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.conditional_create("k", ttl).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(!store.conditional_create("k", ttl).await.unwrap());
        // Had the duplicate refreshed the record, it would live until t=18.
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(store.conditional_create("k", ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_resets_after_window() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(30);

        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 1);
        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 2);
        assert_eq!(store.get_counter("c").await.unwrap(), Some(2));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.get_counter("c").await.unwrap(), None);
        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.conditional_create("short", Duration::from_secs(1)).await.unwrap();
        store.conditional_create("long", Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_conditional_create_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.conditional_create("race", Duration::from_secs(60)).await.unwrap()
            }));
        }

        let winners = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|result| *result.as_ref().unwrap())
            .count();
        assert_eq!(winners, 1);
    }
}
