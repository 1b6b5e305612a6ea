//! Fixed-window delivery caps per fingerprint and globally.

use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;

use crate::{context::PipelineMetrics, persistence::SharedStore};

/// The key space a cap is enforced over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "key")]
pub enum ThrottleScope {
    /// Repeats of one logical incident.
    Fingerprint(String),
    /// All outbound traffic of the deployment.
    Global,
}

impl fmt::Display for ThrottleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottleScope::Fingerprint(fp) => write!(f, "fp:{fp}"),
            ThrottleScope::Global => f.write_str("global"),
        }
    }
}

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The call is within the cap.
    Allowed,
    /// The cap for the current window is used up.
    Throttled,
}

/// Rate limiter counting in the shared store. Windows are fixed: the first
/// increment opens a window of `window` length and the counter resets when
/// it expires. Fails open like [`super::dedup::DedupStore`].
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    key_prefix: String,
    metrics: Arc<PipelineMetrics>,
}

impl RateLimiter {
    /// Creates a rate limiter writing counters under `{key_prefix}:rate:`.
    pub fn new(
        store: Arc<dyn SharedStore>,
        key_prefix: impl Into<String>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self { store, key_prefix: key_prefix.into(), metrics }
    }

    /// Counts one call against `scope` and decides whether it may proceed.
    pub async fn allow(
        &self,
        scope: &ThrottleScope,
        window: Duration,
        max_count: u64,
    ) -> RateDecision {
        let key = format!("{}:rate:{}", self.key_prefix, scope);
        match self.store.increment_with_expiry(&key, window).await {
            Ok(count) if count > max_count => {
                tracing::debug!(%scope, count, max_count, "Rate limit reached.");
                RateDecision::Throttled
            }
            Ok(_) => RateDecision::Allowed,
            Err(e) => {
                self.metrics.record_store_degraded();
                tracing::warn!(%scope, error = %e, "Rate limit store unavailable, failing open.");
                RateDecision::Allowed
            }
        }
    }
}
