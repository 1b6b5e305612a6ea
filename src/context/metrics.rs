use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

/// Counters for every terminal outcome of the pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    received: AtomicU64,
    ignored: AtomicU64,
    duplicates: AtomicU64,
    throttled: AtomicU64,
    batched: AtomicU64,
    digests: AtomicU64,
    delivered: AtomicU64,
    failed_permanent: AtomicU64,
    failed_exhausted: AtomicU64,
    store_degraded: AtomicU64,
    abandoned: AtomicU64,
}

/// A point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub ignored: u64,
    pub duplicates: u64,
    pub throttled: u64,
    pub batched: u64,
    pub digests: u64,
    pub delivered: u64,
    pub failed_permanent: u64,
    pub failed_exhausted: u64,
    pub store_degraded: u64,
    pub abandoned: u64,
}

macro_rules! counters {
    ($($field:ident => $inc:ident),* $(,)?) => {
        impl PipelineMetrics {
            $(
                #[doc = concat!("Increments the `", stringify!($field), "` counter.")]
                pub fn $inc(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            /// Reads every counter.
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot { $($field: self.$field.load(Ordering::Relaxed)),* }
            }
        }
    };
}

counters! {
    received => record_received,
    ignored => record_ignored,
    duplicates => record_duplicate,
    throttled => record_throttled,
    batched => record_batched,
    digests => record_digest,
    delivered => record_delivered,
    failed_permanent => record_failed_permanent,
    failed_exhausted => record_failed_exhausted,
    store_degraded => record_store_degraded,
    abandoned => record_abandoned,
}

impl PipelineMetrics {
    /// Adds `count` abandoned deliveries at once (shutdown drain).
    pub fn record_abandoned_many(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }
}

/// Shared application metrics for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppMetrics {
    /// The time the application started.
    pub start_time: tokio::time::Instant,
    /// Pipeline counters.
    pub pipeline: Arc<PipelineMetrics>,
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self { start_time: tokio::time::Instant::now(), pipeline: Arc::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = PipelineMetrics::default();
        metrics.record_received();
        metrics.record_received();
        metrics.record_duplicate();
        metrics.record_abandoned_many(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.duplicates, 1);
        assert_eq!(snapshot.abandoned, 3);
        assert_eq!(snapshot.delivered, 0);
    }
}
