//! The incident pipeline: fingerprinting, dedup, rate limiting, batching,
//! and the schedulers that feed the dispatcher.

pub mod batch;
pub mod dedup;
pub mod digest;
pub mod dispatcher;
pub mod filter;
pub mod fingerprint;
pub mod health;
pub mod rate_limit;

pub use batch::{BatchAggregator, BatchDigest};
pub use dedup::{DedupOutcome, DedupStore};
pub use digest::{DigestFire, DigestScheduler, next_fire_after};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use filter::IncidentFilter;
pub use fingerprint::fingerprint;
pub use health::HealthMonitor;
pub use rate_limit::{RateDecision, RateLimiter, ThrottleScope};
