//! Shared "have we alerted on this recently" oracle.

use std::{sync::Arc, time::Duration};

use crate::{context::PipelineMetrics, persistence::SharedStore};

/// Result of a dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// No live marker existed; this caller created it.
    Fresh,
    /// A live marker exists; the incident was already alerted on.
    Duplicate,
}

/// Deduplication on top of the shared store's conditional-create.
///
/// If the store cannot be reached the check fails open and reports
/// [`DedupOutcome::Fresh`]: duplicate suppression is best effort during
/// store outages, an alert is never lost because of one.
pub struct DedupStore {
    store: Arc<dyn SharedStore>,
    key_prefix: String,
    metrics: Arc<PipelineMetrics>,
}

impl DedupStore {
    /// Creates a dedup store writing markers under `{key_prefix}:dedup:`.
    pub fn new(
        store: Arc<dyn SharedStore>,
        key_prefix: impl Into<String>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { store, key_prefix: key_prefix.into(), metrics }
    }

    /// Marks `fingerprint` as alerted for `ttl` unless a live marker exists.
    /// A duplicate does not extend the existing marker.
    pub async fn check_and_mark(&self, fingerprint: &str, ttl: Duration) -> DedupOutcome {
        let key = format!("{}:dedup:{}", self.key_prefix, fingerprint);
        match self.store.conditional_create(&key, ttl).await {
            Ok(true) => DedupOutcome::Fresh,
            Ok(false) => {
                tracing::debug!(fingerprint, "Duplicate incident suppressed.");
                DedupOutcome::Duplicate
            }
            Err(e) => {
                self.metrics.record_store_degraded();
                tracing::warn!(
                    fingerprint,
                    error = %e,
                    "Dedup store unavailable, failing open."
                );
                DedupOutcome::Fresh
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::persistence::{MemoryStore, StoreError, traits::MockSharedStore};

    #[tokio::test(start_paused = true)]
    async fn test_fresh_then_duplicate_then_fresh_after_ttl() {
        let dedup = DedupStore::new(Arc::new(MemoryStore::new()), "m", Arc::default());
        let ttl = Duration::from_secs(60);

        assert_eq!(dedup.check_and_mark("error:abc", ttl).await, DedupOutcome::Fresh);
        assert_eq!(dedup.check_and_mark("error:abc", ttl).await, DedupOutcome::Duplicate);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(dedup.check_and_mark("error:abc", ttl).await, DedupOutcome::Fresh);
    }

    #[tokio::test]
    async fn test_uses_prefixed_key() {
        let mut store = MockSharedStore::new();
        store
            .expect_conditional_create()
            .with(eq("monitoring:dedup:error:abc"), eq(Duration::from_secs(5)))
            .times(1)
            .returning(|_, _| Ok(false));

        let dedup = DedupStore::new(Arc::new(store), "monitoring", Arc::default());
        assert_eq!(
            dedup.check_and_mark("error:abc", Duration::from_secs(5)).await,
            DedupOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_fails_open_and_records_degradation() {
        let mut store = MockSharedStore::new();
        store
            .expect_conditional_create()
            .returning(|_, _| Err(StoreError::Unavailable("connection refused".into())));
        let metrics = Arc::new(PipelineMetrics::default());

        let dedup = DedupStore::new(Arc::new(store), "m", metrics.clone());
        assert_eq!(
            dedup.check_and_mark("error:abc", Duration::from_secs(5)).await,
            DedupOutcome::Fresh
        );
        assert_eq!(metrics.snapshot().store_degraded, 1);
    }
}
