//! The single entry point incidents are pushed into.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{
    batch::BatchAggregator,
    dedup::{DedupOutcome, DedupStore},
    filter::IncidentFilter,
    fingerprint::fingerprint,
    rate_limit::{RateDecision, RateLimiter, ThrottleScope},
};
use crate::{
    config::{AppConfig, RateLimitConfig},
    context::PipelineMetrics,
    delivery::{
        DeliveryChannel, DeliveryOutcome, DeliveryTracker, FailureKind, OutboundMessage,
        TaskHandle,
    },
    models::{Category, IncidentEvent, Severity, StatsPeriod, stats::start_of_hour},
    persistence::SharedStore,
};

/// How long hourly incident counters are kept. Covers a full digest period
/// plus a late fire.
const INCIDENT_COUNTER_WINDOW: Duration = Duration::from_secs(48 * 60 * 60);

/// What [`Dispatcher::handle`] did with an incident. Suppression is a normal
/// outcome, not an error.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Handed to the delivery channel.
    Dispatched(TaskHandle),
    /// Added to the open batch.
    Batched,
    /// Already alerted on within the dedup window.
    Duplicate,
    /// Over the cap of the given scope.
    Throttled(ThrottleScope),
    /// Dropped by the filter; carries the matching rule.
    Ignored(String),
    /// The pipeline is switched off.
    Disabled,
}

impl DispatchOutcome {
    /// Short stable name, used in logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchOutcome::Dispatched(_) => "dispatched",
            DispatchOutcome::Batched => "batched",
            DispatchOutcome::Duplicate => "duplicate",
            DispatchOutcome::Throttled(_) => "throttled",
            DispatchOutcome::Ignored(_) => "ignored",
            DispatchOutcome::Disabled => "disabled",
        }
    }
}

/// Composes filtering, dedup, rate limiting, batching and delivery.
pub struct Dispatcher {
    environment: String,
    key_prefix: String,
    dedup_ttl: Duration,
    rate_limit: RateLimitConfig,
    filter: IncidentFilter,
    store: Arc<dyn SharedStore>,
    dedup: DedupStore,
    limiter: RateLimiter,
    batch: BatchAggregator,
    channel: Option<Arc<DeliveryChannel>>,
    tracker: Arc<DeliveryTracker>,
    metrics: Arc<PipelineMetrics>,
}

impl Dispatcher {
    /// Creates a dispatcher. Without a channel, or with `enabled = false`,
    /// every incident is answered with [`DispatchOutcome::Disabled`].
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SharedStore>,
        channel: Option<DeliveryChannel>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let channel = channel.filter(|_| config.enabled).map(Arc::new);
        Self {
            environment: config.environment.clone(),
            key_prefix: config.key_prefix.clone(),
            dedup_ttl: config.dedup_ttl_secs,
            rate_limit: config.rate_limit.clone(),
            filter: IncidentFilter::new(&config.filters),
            dedup: DedupStore::new(Arc::clone(&store), &config.key_prefix, Arc::clone(&metrics)),
            limiter: RateLimiter::new(Arc::clone(&store), &config.key_prefix, Arc::clone(&metrics)),
            store,
            batch: BatchAggregator::new(config.batch.max_entries),
            channel,
            tracker: Arc::new(DeliveryTracker::new(config.delivery_mode, Arc::clone(&metrics))),
            metrics,
        }
    }

    /// Routes one incident. Never fails and never waits on the network in
    /// background delivery mode; store round trips are the only suspension
    /// points.
    pub async fn handle(&self, event: IncidentEvent) -> DispatchOutcome {
        let Some(channel) = &self.channel else {
            return DispatchOutcome::Disabled;
        };
        self.metrics.record_received();

        if let Some(rule) = self.filter.ignore_reason(&event) {
            self.metrics.record_ignored();
            tracing::debug!(source = %event.source(), rule, "Incident ignored by filter.");
            return DispatchOutcome::Ignored(rule.to_string());
        }

        if event.category() == Category::Digest {
            self.metrics.record_digest();
            return DispatchOutcome::Dispatched(self.deliver(channel, &event).await);
        }

        self.count_incident(event.category()).await;

        let fp = fingerprint(&event);
        if self.dedup.check_and_mark(&fp, self.dedup_ttl).await == DedupOutcome::Duplicate {
            self.metrics.record_duplicate();
            return DispatchOutcome::Duplicate;
        }

        let scopes = [
            (ThrottleScope::Fingerprint(fp), self.rate_limit.per_fingerprint_max),
            (ThrottleScope::Global, self.rate_limit.global_max),
        ];
        for (scope, max_count) in scopes {
            if self.limiter.allow(&scope, self.rate_limit.window_secs, max_count).await
                == RateDecision::Throttled
            {
                self.metrics.record_throttled();
                tracing::info!(%scope, source = %event.source(), "Incident throttled.");
                return DispatchOutcome::Throttled(scope);
            }
        }

        if event.severity() == Severity::Critical {
            return DispatchOutcome::Dispatched(self.deliver(channel, &event).await);
        }

        self.metrics.record_batched();
        if self.batch.enqueue(event) {
            tracing::debug!("Batch is full, flushing early.");
            self.flush_batch().await;
        }
        DispatchOutcome::Batched
    }

    /// Flushes the open batch as one digest. Returns `None` if nothing was
    /// buffered.
    pub async fn flush_batch(&self) -> Option<TaskHandle> {
        let channel = self.channel.as_ref()?;
        let digest = self.batch.flush()?;
        tracing::info!(entries = digest.entries.len(), "Flushing incident batch.");
        self.metrics.record_digest();
        Some(self.deliver(channel, &digest.into_incident()).await)
    }

    /// Flushes the open batch every `period` until `cancel` fires.
    pub async fn run_batch_flusher(&self, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Batch flusher received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    tracing::debug!("Running batch flush...");
                    self.flush_batch().await;
                }
            }
        }
    }

    /// Incident counts per category over the hours that begin inside
    /// `period`. Categories without incidents are left out.
    pub async fn incident_counts(&self, period: &StatsPeriod) -> BTreeMap<Category, u64> {
        let mut counts = BTreeMap::new();
        for category in Category::ALL.into_iter().filter(|c| *c != Category::Digest) {
            for hour in period.hours() {
                match self.store.get_counter(&self.hourly_counter_key(hour, category)).await {
                    Ok(Some(count)) => *counts.entry(category).or_insert(0) += count,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(%category, error = %e, "Failed to read incident counter.");
                        break;
                    }
                }
            }
        }
        counts
    }

    /// The tracker owning in-flight deliveries.
    pub fn tracker(&self) -> &Arc<DeliveryTracker> {
        &self.tracker
    }

    /// The shared pipeline counters.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// The shared store this dispatcher coordinates through.
    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    /// The key namespace in the shared store.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Returns `true` if incidents are processed.
    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Number of incidents in the open batch.
    pub fn pending_batch_len(&self) -> usize {
        self.batch.len()
    }

    fn hourly_counter_key(&self, hour: DateTime<Utc>, category: Category) -> String {
        format!("{}:stats:{}:{}", self.key_prefix, hour.format("%Y-%m-%dT%H"), category)
    }

    async fn count_incident(&self, category: Category) {
        let key = self.hourly_counter_key(start_of_hour(Utc::now()), category);
        if let Err(e) = self.store.increment_with_expiry(&key, INCIDENT_COUNTER_WINDOW).await {
            tracing::debug!(%category, error = %e, "Failed to count incident.");
        }
    }

    async fn deliver(&self, channel: &Arc<DeliveryChannel>, event: &IncidentEvent) -> TaskHandle {
        let message = OutboundMessage::from_incident(event, &self.environment);
        let channel = Arc::clone(channel);
        let metrics = Arc::clone(&self.metrics);

        self.tracker
            .spawn(async move {
                let outcome = channel.send(message).await;
                match outcome {
                    DeliveryOutcome::Delivered { .. } => metrics.record_delivered(),
                    DeliveryOutcome::Failed { kind: FailureKind::Permanent, .. } => {
                        metrics.record_failed_permanent()
                    }
                    DeliveryOutcome::Failed { kind: FailureKind::RetryableExhausted, .. } => {
                        metrics.record_failed_exhausted()
                    }
                }
                outcome
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mockall::predicate::always;

    use super::*;
    use crate::{
        config::DeliveryMode,
        delivery::TaskStatus,
        http_client::create_http_client,
        persistence::{MemoryStore, StoreError, traits::MockSharedStore},
    };

    fn config(server_url: &str) -> AppConfig {
        AppConfig::builder()
            .telegram(server_url, "TOKEN", "42")
            .delivery_mode(DeliveryMode::Synchronous)
            .build()
    }

    fn dispatcher(config: &AppConfig, store: Arc<dyn SharedStore>) -> Dispatcher {
        let client = create_http_client(&config.http_base_config).unwrap();
        let channel = DeliveryChannel::new(&config.telegram, &config.delivery, client).unwrap();
        Dispatcher::new(config, store, Some(channel), Arc::default())
    }

    #[tokio::test]
    async fn test_disabled_pipeline_touches_nothing() {
        let config = AppConfig::builder().enabled(false).build();
        let dispatcher = Dispatcher::new(&config, Arc::new(MockSharedStore::new()), None, Arc::default());

        let outcome = dispatcher.handle(IncidentEvent::error("/a", "KeyError", "")).await;
        assert!(matches!(outcome, DispatchOutcome::Disabled));
        assert_eq!(dispatcher.metrics().snapshot().received, 0);
    }

    #[tokio::test]
    async fn test_ignored_incident_skips_store() {
        // A mock without expectations panics on any store call.
        let config = config("http://127.0.0.1:9");
        let dispatcher = dispatcher(&config, Arc::new(MockSharedStore::new()));

        let outcome = dispatcher.handle(IncidentEvent::error("/api", "HTTPException", "")).await;
        assert!(matches!(outcome, DispatchOutcome::Ignored(rule) if rule == "HTTPException"));
    }

    #[tokio::test]
    async fn test_critical_is_delivered_and_duplicate_suppressed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let config = config(&server.url());
        let dispatcher = dispatcher(&config, Arc::new(MemoryStore::new()));

        let first = dispatcher.handle(IncidentEvent::error("/a", "KeyError", "one")).await;
        let second = dispatcher.handle(IncidentEvent::error("/a", "KeyError", "two")).await;

        match first {
            DispatchOutcome::Dispatched(handle) => {
                assert_eq!(handle.status(), TaskStatus::Succeeded { attempts: 1 })
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(second, DispatchOutcome::Duplicate));
        assert_eq!(dispatcher.metrics().snapshot().delivered, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_per_fingerprint_throttle_with_short_dedup() {
        let config = AppConfig::builder()
            .telegram("http://127.0.0.1:9", "TOKEN", "42")
            .dedup_ttl(Duration::from_millis(1))
            .rate_limit(Duration::from_secs(600), 1, 100)
            .build();
        let dispatcher = dispatcher(&config, Arc::new(MemoryStore::new()));

        let warning = || IncidentEvent::slow_request("/slow", "GET", 5.0);
        assert!(matches!(dispatcher.handle(warning()).await, DispatchOutcome::Batched));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(matches!(
            dispatcher.handle(warning()).await,
            DispatchOutcome::Throttled(ThrottleScope::Fingerprint(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_full_triggers_flush() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(mockito::Matcher::Regex("2 incidents".to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let config = AppConfig::builder()
            .telegram(&server.url(), "TOKEN", "42")
            .delivery_mode(DeliveryMode::Synchronous)
            .batch(Duration::from_secs(900), 2)
            .build();
        let dispatcher = dispatcher(&config, Arc::new(MemoryStore::new()));

        dispatcher.handle(IncidentEvent::slow_request("/a", "GET", 4.0)).await;
        dispatcher.handle(IncidentEvent::slow_request("/b", "GET", 4.0)).await;

        assert_eq!(dispatcher.pending_batch_len(), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let mut store = MockSharedStore::new();
        store
            .expect_increment_with_expiry()
            .with(always(), always())
            .returning(|_, _| Err(StoreError::Unavailable("down".into())));
        store
            .expect_conditional_create()
            .returning(|_, _| Err(StoreError::Unavailable("down".into())));
        let config = config(&server.url());
        let dispatcher = dispatcher(&config, Arc::new(store));

        let outcome = dispatcher.handle(IncidentEvent::error("/a", "KeyError", "")).await;
        assert!(matches!(outcome, DispatchOutcome::Dispatched(_)));
        // Dedup, per-fingerprint and global checks each degrade once.
        assert_eq!(dispatcher.metrics().snapshot().store_degraded, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_incident_counts_sum_hours_of_period() {
        let mut store = MockSharedStore::new();
        store.expect_get_counter().times(3 * 24).returning(|key| {
            Ok(match key {
                "monitoring:stats:2025-03-01T09:error" => Some(4),
                "monitoring:stats:2025-03-02T08:error" => Some(3),
                "monitoring:stats:2025-03-01T20:health" => Some(1),
                // Outside the period.
                "monitoring:stats:2025-03-02T09:error" => Some(100),
                _ => None,
            })
        });
        let config = AppConfig::builder().enabled(false).build();
        let dispatcher = Dispatcher::new(&config, Arc::new(store), None, Arc::default());

        let fire = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();
        let counts = dispatcher.incident_counts(&StatsPeriod::last_day_aligned(fire)).await;
        assert_eq!(counts, BTreeMap::from([(Category::Error, 7), (Category::Health, 1)]));
    }
}
