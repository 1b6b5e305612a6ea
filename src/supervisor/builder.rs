//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use reqwest_middleware::ClientWithMiddleware;
use tokio_util::sync::CancellationToken;

use super::{Supervisor, SupervisorError};
use crate::{
    config::AppConfig,
    context::{AppContext, AppMetrics},
    delivery::DeliveryChannel,
    engine::{DigestScheduler, Dispatcher, HealthMonitor},
    http_client::create_http_client,
    persistence::{SharedStore, SqliteStore},
    providers::{HealthCheck, StatsProvider, StoreHealthCheck},
};

/// A builder for creating a `Supervisor` instance.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn SharedStore>>,
    sqlite: Option<Arc<SqliteStore>>,
    http_client: Option<Arc<ClientWithMiddleware>>,
    app_metrics: Option<AppMetrics>,
    stats: Option<Arc<dyn StatsProvider>>,
    health_checks: Vec<Arc<dyn HealthCheck>>,
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes configuration, store, client and metrics from an `AppContext`.
    pub fn context(mut self, context: AppContext) -> Self {
        self.config = Some(context.config);
        self.store = Some(context.store);
        self.sqlite = context.sqlite;
        self.http_client = Some(context.http_client);
        self.app_metrics = Some(context.metrics);
        self
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the shared coordination store.
    pub fn store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the HTTP client used for deliveries. Created from the
    /// configuration if not provided.
    pub fn http_client(mut self, client: Arc<ClientWithMiddleware>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the collaborator that supplies daily digest statistics.
    pub fn stats_provider(mut self, stats: Arc<dyn StatsProvider>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Registers an additional health check.
    pub fn health_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.health_checks.push(check);
        self
    }

    /// Validates the configuration and wires the dispatcher and background
    /// services. The shared store is always health-checked.
    pub async fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let store = self.store.ok_or(SupervisorError::MissingStore)?;
        config.validate()?;

        let app_metrics = self.app_metrics.unwrap_or_default();
        let channel = if config.enabled {
            let client = match self.http_client {
                Some(client) => client,
                None => create_http_client(&config.http_base_config)?,
            };
            Some(DeliveryChannel::new(&config.telegram, &config.delivery, client)?)
        } else {
            tracing::warn!("Monitoring is disabled; incidents will be dropped.");
            None
        };

        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            Arc::clone(&store),
            channel,
            Arc::clone(&app_metrics.pipeline),
        ));

        let digest = config.digest.enabled.then(|| {
            Arc::new(DigestScheduler::new(
                Arc::clone(&dispatcher),
                self.stats,
                config.digest.hour,
                config.digest.minute,
            ))
        });

        let mut checks: Vec<Arc<dyn HealthCheck>> =
            vec![Arc::new(StoreHealthCheck::new(Arc::clone(&store), &config.key_prefix))];
        checks.extend(self.health_checks);
        tracing::info!(count = checks.len(), "Health checks registered.");
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&dispatcher),
            checks,
            config.health.interval_secs,
            config.health.timeout_secs,
        ));

        Ok(Supervisor {
            config: Arc::new(config),
            dispatcher,
            digest,
            health,
            sqlite: self.sqlite,
            app_metrics,
            cancellation_token: CancellationToken::new(),
            join_set: tokio::task::JoinSet::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        persistence::{MemoryStore, traits::MockSharedStore},
        providers::traits::MockStatsProvider,
        test_helpers::StubHealthCheck,
    };

    fn valid_config() -> AppConfig {
        AppConfig::builder().telegram("http://127.0.0.1:9", "TOKEN", "42").build()
    }

    #[tokio::test]
    async fn build_succeeds_with_valid_config() {
        let result = SupervisorBuilder::new()
            .config(valid_config())
            .store(Arc::new(MockSharedStore::new()))
            .stats_provider(Arc::new(MockStatsProvider::new()))
            .build()
            .await;

        let supervisor = result.unwrap();
        assert!(supervisor.dispatcher().is_enabled());
        assert!(supervisor.digest.is_some());
    }

    #[tokio::test]
    async fn build_fails_if_config_is_missing() {
        let result = SupervisorBuilder::new().store(Arc::new(MockSharedStore::new())).build().await;
        assert!(matches!(result, Err(SupervisorError::MissingConfig)));
    }

    #[tokio::test]
    async fn build_fails_if_store_is_missing() {
        let result = SupervisorBuilder::new().config(valid_config()).build().await;
        assert!(matches!(result, Err(SupervisorError::MissingStore)));
    }

    #[tokio::test]
    async fn build_fails_without_credentials() {
        let result = SupervisorBuilder::new()
            .config(AppConfig::default())
            .store(Arc::new(MockSharedStore::new()))
            .build()
            .await;
        assert!(matches!(result, Err(SupervisorError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn build_disabled_pipeline_without_credentials() {
        let mut config = AppConfig::builder().enabled(false).build();
        config.digest.enabled = false;

        let supervisor = SupervisorBuilder::new()
            .config(config)
            .store(Arc::new(MockSharedStore::new()))
            .build()
            .await
            .unwrap();
        assert!(!supervisor.dispatcher().is_enabled());
        assert!(supervisor.digest.is_none());
    }

    #[tokio::test]
    async fn build_runs_registered_health_checks_with_the_store_check() {
        let config = AppConfig::builder().enabled(false).build();
        let healthy = Arc::new(StubHealthCheck::healthy("cache"));
        let failing = Arc::new(StubHealthCheck::failing("queue", "backlog too large"));

        let supervisor = SupervisorBuilder::new()
            .config(config)
            .store(Arc::new(MemoryStore::new()))
            .health_check(Arc::clone(&healthy) as Arc<dyn HealthCheck>)
            .health_check(Arc::clone(&failing) as Arc<dyn HealthCheck>)
            .build()
            .await
            .unwrap();

        let reported = supervisor.health.run_checks().await;
        let names: Vec<&str> = reported.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["queue"]);
        assert_eq!(healthy.calls(), 1);
        assert_eq!(failing.calls(), 1);
    }
}
