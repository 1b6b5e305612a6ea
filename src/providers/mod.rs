//! Collaborators consulted by the pipeline: statistics sources and health
//! checks.

pub mod health_checks;
pub mod traits;

pub use health_checks::{HttpHealthCheck, StoreHealthCheck};
pub use traits::{HealthCheck, HealthCheckError, StatsError, StatsProvider};
