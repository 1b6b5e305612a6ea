//! The primitives the pipeline needs from a shared key-value store.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::error::StoreError;

/// A key-value store shared by every worker. Records expire on their own;
/// the pipeline never deletes them explicitly.
///
/// Implementations must make both write primitives atomic with respect to
/// concurrent callers in other processes. Without that, duplicate suppression
/// and rate limiting degrade to best effort.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Creates `key` with the given time-to-live if no live record exists.
    /// Returns `true` if this call created the record. An existing live
    /// record is left untouched, including its expiry.
    async fn conditional_create(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Increments the counter at `key` and returns the new value. The first
    /// increment of a window (no live record) starts at 1 and sets the expiry
    /// to `now + window`; later increments keep that expiry.
    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64, StoreError>;

    /// Reads a live counter without modifying it.
    async fn get_counter(&self, key: &str) -> Result<Option<u64>, StoreError>;
}
