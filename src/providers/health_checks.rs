//! Built-in health checks.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;

use super::traits::{HealthCheck, HealthCheckError};
use crate::persistence::SharedStore;

/// Checks that a URL answers with a 2xx status.
pub struct HttpHealthCheck {
    name: String,
    url: String,
    client: Arc<ClientWithMiddleware>,
}

impl HttpHealthCheck {
    /// Creates a check named `name` probing `url`.
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: Arc<ClientWithMiddleware>) -> Self {
        Self { name: name.into(), url: url.into(), client }
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<(), HealthCheckError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| HealthCheckError::Unreachable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HealthCheckError::Unhealthy(format!("{} returned {}", self.url, status)))
        }
    }
}

/// Round-trips a counter through the shared store.
pub struct StoreHealthCheck {
    store: Arc<dyn SharedStore>,
    marker_key: String,
}

impl StoreHealthCheck {
    /// Creates a check writing a marker under `{key_prefix}:health:marker`.
    pub fn new(store: Arc<dyn SharedStore>, key_prefix: &str) -> Self {
        Self { store, marker_key: format!("{key_prefix}:health:marker") }
    }
}

#[async_trait]
impl HealthCheck for StoreHealthCheck {
    fn name(&self) -> &str {
        "shared_store"
    }

    async fn check(&self) -> Result<(), HealthCheckError> {
        self.store
            .increment_with_expiry(&self.marker_key, Duration::from_secs(60))
            .await
            .map(|_| ())
            .map_err(|e| HealthCheckError::Unreachable(e.to_string()))
    }
}
