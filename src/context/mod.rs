//! Application context and initialization logic.
//! This module loads the configuration, opens the shared store and builds
//! the HTTP client. The `AppContext` struct bundles these for the
//! supervisor and the CLI commands.

mod error;
mod metrics;

use std::sync::Arc;

pub use error::AppContextError;
pub use metrics::{AppMetrics, MetricsSnapshot, PipelineMetrics};
use reqwest_middleware::ClientWithMiddleware;

use crate::{
    config::AppConfig,
    http_client::create_http_client,
    persistence::{SharedStore, SqliteStore, StoreBackend},
};

/// The application context, holding configuration, the shared store and the
/// delivery HTTP client.
pub struct AppContext {
    /// Shared application configuration.
    pub config: AppConfig,

    /// The coordination store shared by all workers.
    pub store: Arc<dyn SharedStore>,

    /// The concrete SQLite handle when SQLite backs the store, kept for
    /// maintenance and shutdown.
    pub sqlite: Option<Arc<SqliteStore>>,

    /// The pooled client used for deliveries and HTTP health checks.
    pub http_client: Arc<ClientWithMiddleware>,

    /// Uptime and pipeline counters.
    pub metrics: AppMetrics,
}

/// A builder for the `AppContext`, allowing configuration overrides
/// and step-by-step initialization.
#[derive(Debug, Default)]
pub struct AppContextBuilder {
    /// Optional configuration directory to load settings from.
    config_dir: Option<String>,

    /// Optional override for the database URL.
    database_url_override: Option<String>,
}

impl AppContextBuilder {
    /// Creates a new `AppContextBuilder` with an optional configuration
    /// directory.
    pub fn new(config_dir: Option<String>) -> Self {
        Self { config_dir, database_url_override: None }
    }

    /// Sets a database URL override.
    pub fn database_url(mut self, url: String) -> Self {
        self.database_url_override = Some(url);
        self
    }

    /// Builds the `AppContext`: loads and validates the configuration, opens
    /// the store selected by `database_url`, runs migrations and creates the HTTP client.
    pub async fn build(self) -> Result<AppContext, AppContextError> {
        tracing::debug!("Loading application configuration...");
        let mut config = AppConfig::new(self.config_dir.as_deref())?;
        tracing::debug!(
            environment = %config.environment,
            enabled = config.enabled,
            database_url = %config.database_url,
            "Configuration loaded."
        );

        if let Some(db_url) = self.database_url_override {
            tracing::info!(database_url = %db_url, "Overriding database URL.");
            config.database_url = db_url;
        }

        tracing::debug!("Initializing shared store...");
        let backend = StoreBackend::connect(&config.database_url).await?;
        tracing::info!(backend = backend.kind(), "Shared store ready.");

        let http_client = create_http_client(&config.http_base_config)?;

        Ok(AppContext {
            config,
            store: backend.shared(),
            sqlite: backend.sqlite(),
            http_client,
            metrics: AppMetrics::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> tempfile::TempDir {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("app.yaml"), content).unwrap();
        temp_dir
    }

    #[test]
    fn test_app_context_builder_with_database_override() {
        let builder = AppContextBuilder::new(None).database_url("sqlite::memory:".to_string());
        assert_eq!(builder.database_url_override, Some("sqlite::memory:".to_string()));
    }

    #[tokio::test]
    async fn test_build_with_disabled_pipeline_needs_no_credentials() {
        let dir = write_config("enabled: false\n");
        let context = AppContextBuilder::new(Some(dir.path().to_str().unwrap().to_string()))
            .database_url("sqlite::memory:".to_string())
            .build()
            .await
            .unwrap();

        assert!(!context.config.enabled);
        assert!(context.sqlite.is_some());
        assert!(
            context.store.conditional_create("smoke", std::time::Duration::from_secs(5)).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_build_fails_without_credentials() {
        let dir = write_config("enabled: true\n");
        let result = AppContextBuilder::new(Some(dir.path().to_str().unwrap().to_string()))
            .database_url("sqlite::memory:".to_string())
            .build()
            .await;

        assert!(matches!(result, Err(AppContextError::Config(_))));
    }
}
