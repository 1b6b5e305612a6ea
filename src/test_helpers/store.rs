use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;

use crate::persistence::{SharedStore, StoreError};

/// A store that fails every operation, for fail-open tests.
#[derive(Debug, Default)]
pub struct UnavailableStore {
    calls: AtomicUsize,
}

impl UnavailableStore {
    /// Creates a new unreachable store.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many operations were attempted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail(&self) -> StoreError {
        self.calls.fetch_add(1, Ordering::Relaxed);
        StoreError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl SharedStore for UnavailableStore {
    async fn conditional_create(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
        Err(self.fail())
    }

    async fn increment_with_expiry(&self, _key: &str, _window: Duration) -> Result<u64, StoreError> {
        Err(self.fail())
    }

    async fn get_counter(&self, _key: &str) -> Result<Option<u64>, StoreError> {
        Err(self.fail())
    }
}
