use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{
    models::StatsPeriod,
    providers::{HealthCheck, HealthCheckError, StatsError, StatsProvider},
};

/// A health check with a fixed result.
pub struct StubHealthCheck {
    name: String,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl StubHealthCheck {
    /// A check that always passes.
    pub fn healthy(name: &str) -> Self {
        Self { name: name.to_string(), failure: None, calls: AtomicUsize::new(0) }
    }

    /// A check that always fails with `reason`.
    pub fn failing(name: &str, reason: &str) -> Self {
        Self { name: name.to_string(), failure: Some(reason.to_string()), calls: AtomicUsize::new(0) }
    }

    /// How many times the check ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HealthCheck for StubHealthCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<(), HealthCheckError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.failure {
            Some(reason) => Err(HealthCheckError::Unhealthy(reason.clone())),
            None => Ok(()),
        }
    }
}

/// A stats provider returning `value` for user counters. Project counters
/// are unsupported.
pub struct StaticStatsProvider {
    value: u64,
}

impl StaticStatsProvider {
    /// Creates a provider answering every user counter with `value`.
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

#[async_trait]
impl StatsProvider for StaticStatsProvider {
    async fn new_users(&self, _period: &StatsPeriod) -> Result<u64, StatsError> {
        Ok(self.value)
    }

    async fn active_users(&self, _period: &StatsPeriod) -> Result<u64, StatsError> {
        Ok(self.value)
    }

    async fn total_users(&self) -> Result<u64, StatsError> {
        Ok(self.value)
    }

    async fn new_projects(&self, _period: &StatsPeriod) -> Result<u64, StatsError> {
        Err(StatsError::Unsupported("projects"))
    }

    async fn updated_projects(&self, _period: &StatsPeriod) -> Result<u64, StatsError> {
        Err(StatsError::Unsupported("projects"))
    }

    async fn total_projects(&self) -> Result<u64, StatsError> {
        Err(StatsError::Unsupported("projects"))
    }
}
