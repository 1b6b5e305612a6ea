//! Periodic health checks reported as incidents.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::{models::IncidentEvent, providers::HealthCheck};

/// Runs every registered check on a fixed interval.
pub struct HealthMonitor {
    dispatcher: Arc<Dispatcher>,
    checks: Vec<Arc<dyn HealthCheck>>,
    interval: Duration,
    timeout: Duration,
}

impl HealthMonitor {
    /// Creates a monitor; each check is bounded by `timeout`.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        checks: Vec<Arc<dyn HealthCheck>>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self { dispatcher, checks, interval, timeout }
    }

    /// Runs all checks concurrently once. Every failure becomes a critical
    /// `health` incident routed through the dispatcher, so dedup and rate
    /// limits apply to repeated failures.
    pub async fn run_checks(&self) -> Vec<(String, DispatchOutcome)> {
        let results = futures::future::join_all(self.checks.iter().map(|check| async move {
            let result = tokio::time::timeout(self.timeout, check.check()).await;
            (check.name().to_string(), result)
        }))
        .await;

        let mut reported = Vec::new();
        for (name, result) in results {
            let reason = match result {
                Ok(Ok(())) => {
                    tracing::debug!(check = %name, "Health check passed.");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}s", self.timeout.as_secs_f64()),
            };
            tracing::warn!(check = %name, reason = %reason, "Health check failed.");
            let outcome = self.dispatcher.handle(IncidentEvent::health(name.clone(), reason)).await;
            reported.push((name, outcome));
        }
        reported
    }

    /// Runs the checks every interval until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.checks.is_empty() {
            tracing::info!("No health checks registered.");
            return;
        }
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Health monitor received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    self.run_checks().await;
                }
            }
        }
    }
}
