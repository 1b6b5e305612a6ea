//! The Supervisor module manages the lifecycle of the alerting pipeline.
//!
//! The `SupervisorBuilder` wires the dispatcher, the delivery channel and the
//! background services together. The `Supervisor` then runs them under one
//! cancellation token:
//!
//! - the batch flusher, which turns the open batch into a digest on a fixed
//!   cadence;
//! - the daily digest scheduler;
//! - the health monitor;
//! - store maintenance (purging expired records);
//! - the optional ingestion HTTP server.
//!
//! On SIGINT or SIGTERM every service is stopped (the server after finishing
//! the requests it is handling), the open batch is flushed one last time and
//! in-flight deliveries are drained within `shutdown_timeout_secs`.

mod builder;

use std::{sync::Arc, time::Duration};

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{AppConfig, ConfigurationError},
    context::AppMetrics,
    delivery::{DeliveryError, DrainReport},
    engine::{DigestScheduler, Dispatcher, HealthMonitor},
    http_server::{self, ApiState},
    persistence::SqliteStore,
};

/// How often expired store records are purged.
const STORE_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Represents the set of errors that can occur while wiring the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// A shared store was not provided to the `SupervisorBuilder`.
    #[error("Missing shared store for Supervisor")]
    MissingStore,

    /// The configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),

    /// The delivery channel or its HTTP client could not be built.
    #[error("Delivery setup failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// The primary runtime manager for the application.
///
/// The Supervisor owns the dispatcher and the background services, and is
/// responsible for their startup and shutdown.
pub struct Supervisor {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// The single entry point for incidents.
    dispatcher: Arc<Dispatcher>,

    /// Daily digest scheduler, if the digest is enabled.
    digest: Option<Arc<DigestScheduler>>,

    /// Periodic health checks.
    health: Arc<HealthMonitor>,

    /// The SQLite store, if one backs the pipeline. Used for maintenance.
    sqlite: Option<Arc<SqliteStore>>,

    /// The shared application metrics.
    app_metrics: AppMetrics,

    /// A token used to signal a graceful shutdown to all supervised tasks.
    cancellation_token: CancellationToken,

    /// A set of all spawned tasks that the supervisor is actively managing.
    join_set: tokio::task::JoinSet<()>,
}

impl Supervisor {
    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// The dispatcher incidents are pushed into.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The token that stops the supervisor. Cancelling it has the same effect
    /// as a shutdown signal.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Starts all managed services and blocks until shutdown completes.
    pub async fn run(mut self) -> Result<DrainReport, SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => {}
                _ = cancellation_token.cancelled() => return,
            }
            cancellation_token.cancel();
        });

        if self.config.server.enabled {
            let state = ApiState {
                config: Arc::clone(&self.config),
                dispatcher: Arc::clone(&self.dispatcher),
                app_metrics: self.app_metrics.clone(),
            };
            let token = self.cancellation_token.clone();
            self.join_set.spawn(async move {
                if let Err(e) = http_server::run_server_from_config(state, token.clone()).await {
                    tracing::error!(error = %e, "HTTP server failed. Initiating shutdown.");
                    token.cancel();
                }
            });
        }

        let flusher = Arc::clone(&self.dispatcher);
        let flush_period = self.config.batch.flush_period_secs;
        let token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            flusher.run_batch_flusher(flush_period, token).await;
        });

        if let Some(digest) = self.digest.clone() {
            let token = self.cancellation_token.clone();
            self.join_set.spawn(async move {
                digest.run(token).await;
            });
        }

        let health = Arc::clone(&self.health);
        let token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            health.run(token).await;
        });

        if let Some(sqlite) = self.sqlite.clone() {
            let token = self.cancellation_token.clone();
            self.join_set.spawn(async move {
                run_store_maintenance(sqlite, token).await;
            });
        }

        tracing::info!(
            environment = %self.config.environment,
            enabled = self.dispatcher.is_enabled(),
            "Supervisor started."
        );

        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("A critical task failed: {:?}. Initiating shutdown.", e);
                            self.cancellation_token.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => break,
            }
        }

        // Services stop on the token; the server also finishes its in-flight
        // requests. Whatever is still running after the timeout is aborted.
        let grace = self.config.shutdown_timeout_secs;
        let join_set = &mut self.join_set;
        let stopped = tokio::time::timeout(grace, async {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "A supervised task failed while stopping.");
                }
            }
        })
        .await;
        if stopped.is_err() {
            tracing::warn!(
                grace_secs = grace.as_secs_f64(),
                "Supervised tasks did not stop in time, aborting them."
            );
            self.join_set.shutdown().await;
        }
        tracing::info!("All supervised tasks have completed.");

        if self.dispatcher.flush_batch().await.is_some() {
            tracing::info!("Flushed the open batch on shutdown.");
        }
        let report = self.dispatcher.tracker().drain(self.config.shutdown_timeout_secs).await;
        if report.abandoned > 0 {
            tracing::warn!(
                abandoned = report.abandoned,
                "Shutdown drain timed out, pending deliveries were abandoned."
            );
        } else {
            tracing::info!("All pending deliveries finished.");
        }

        if let Some(sqlite) = &self.sqlite {
            sqlite.close().await;
        }

        tracing::info!("Supervisor shutdown complete.");
        Ok(report)
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
        _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
    }
}

async fn run_store_maintenance(sqlite: Arc<SqliteStore>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(STORE_MAINTENANCE_INTERVAL);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => match sqlite.purge_expired().await {
                Ok(removed) => tracing::debug!(removed, "Purged expired store records."),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired store records."),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DeliveryMode,
        engine::DispatchOutcome,
        models::IncidentEvent,
        persistence::{MemoryStore, SharedStore},
    };

    #[tokio::test]
    async fn test_shutdown_flushes_open_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = AppConfig::builder()
            .telegram(&server.url(), "TOKEN", "42")
            .batch(Duration::from_secs(3600), 10)
            .delivery_mode(DeliveryMode::Background)
            .build();
        let supervisor = Supervisor::builder()
            .config(config)
            .store(Arc::new(MemoryStore::new()) as Arc<dyn SharedStore>)
            .build()
            .await
            .unwrap();

        let outcome = supervisor
            .dispatcher()
            .handle(IncidentEvent::slow_request("/reports", "GET", 3.0))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Batched));

        let token = supervisor.cancellation_token();
        let run = tokio::spawn(supervisor.run());
        token.cancel();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.abandoned, 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_supervisor_runs_and_stops() {
        let config = AppConfig::builder().enabled(false).build();
        let supervisor = Supervisor::builder()
            .config(config)
            .store(Arc::new(MemoryStore::new()) as Arc<dyn SharedStore>)
            .build()
            .await
            .unwrap();
        assert!(!supervisor.dispatcher().is_enabled());

        let token = supervisor.cancellation_token();
        let run = tokio::spawn(supervisor.run());
        token.cancel();

        let report = run.await.unwrap().unwrap();
        assert!(report.completed);
        assert_eq!(report.abandoned, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight_ingestion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(200)
            .with_body_from_request(|_| {
                std::thread::sleep(Duration::from_millis(500));
                br#"{"ok":true}"#.to_vec()
            })
            .expect(1)
            .create_async()
            .await;

        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let mut config = AppConfig::builder()
            .telegram(&server.url(), "TOKEN", "42")
            .delivery_mode(DeliveryMode::Synchronous)
            .build();
        config.server.enabled = true;
        config.server.listen_address = format!("127.0.0.1:{port}");
        config.server.api_key = None;
        config.digest.enabled = false;

        let supervisor = Supervisor::builder()
            .config(config)
            .store(Arc::new(MemoryStore::new()) as Arc<dyn SharedStore>)
            .build()
            .await
            .unwrap();
        let dispatcher = Arc::clone(supervisor.dispatcher());
        let token = supervisor.cancellation_token();
        let run = tokio::spawn(supervisor.run());

        let base_url = format!("http://127.0.0.1:{port}");
        let client = reqwest::Client::new();
        for _ in 0..100 {
            if client.get(format!("{base_url}/health")).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let request = tokio::spawn(
            client
                .post(format!("{base_url}/incidents"))
                .json(&serde_json::json!({
                    "category": "error",
                    "severity": "critical",
                    "source": { "location": "/checkout", "kind": "Timeout" },
                    "title": "Timeout"
                }))
                .send(),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();

        run.await.unwrap().unwrap();
        // The handler ran to completion before the supervisor returned.
        assert_eq!(dispatcher.metrics().snapshot().delivered, 1);

        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        mock.assert_async().await;
    }
}
