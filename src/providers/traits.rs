//! This module defines the interfaces of the collaborators that feed the
//! digest scheduler and the health monitor.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::models::StatsPeriod;

/// Errors returned by a statistics provider. The digest treats them as
/// "field omitted".
#[derive(Error, Debug)]
pub enum StatsError {
    /// The backing data source could not be queried.
    #[error("Statistics source unavailable: {0}")]
    Unavailable(String),

    /// The provider does not support this counter.
    #[error("Statistic not supported: {0}")]
    Unsupported(&'static str),
}

/// Errors returned by a health check.
#[derive(Error, Debug)]
pub enum HealthCheckError {
    /// The dependency answered but reported a fault.
    #[error("Unhealthy: {0}")]
    Unhealthy(String),

    /// The dependency could not be reached.
    #[error("Unreachable: {0}")]
    Unreachable(String),
}

/// Supplies the counters of the daily digest.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Users created during `period`.
    async fn new_users(&self, period: &StatsPeriod) -> Result<u64, StatsError>;

    /// Users active during `period`.
    async fn active_users(&self, period: &StatsPeriod) -> Result<u64, StatsError>;

    /// Users overall.
    async fn total_users(&self) -> Result<u64, StatsError>;

    /// Projects created during `period`.
    async fn new_projects(&self, period: &StatsPeriod) -> Result<u64, StatsError>;

    /// Existing projects updated during `period`.
    async fn updated_projects(&self, period: &StatsPeriod) -> Result<u64, StatsError>;

    /// Projects overall.
    async fn total_projects(&self) -> Result<u64, StatsError>;
}

/// A dependency checked periodically by the health monitor.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name used as the incident location, e.g. `database`.
    fn name(&self) -> &str;

    /// Checks the dependency once.
    async fn check(&self) -> Result<(), HealthCheckError>;
}
