//! A set of helpers for testing

mod delivery;
mod incident;
mod providers;
mod store;

pub use delivery::{TEST_TOKEN, create_test_channel, create_test_config, fast_retry_config};
pub use incident::IncidentBuilder;
pub use providers::{StaticStatsProvider, StubHealthCheck};
pub use store::UnavailableStore;
