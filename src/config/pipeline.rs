//! Settings for the dedup, rate-limit, batching, digest and health stages.

use std::time::Duration;

use serde::Deserialize;

use super::deserialize_duration_from_seconds;

/// Rate-limit windows and caps.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of one counting window.
    #[serde(
        default = "default_rate_window",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub window_secs: Duration,

    /// Deliveries allowed per fingerprint within one window.
    #[serde(default = "default_per_fingerprint_max")]
    pub per_fingerprint_max: u64,

    /// Deliveries allowed across all fingerprints within one window.
    #[serde(default = "default_global_max")]
    pub global_max: u64,
}

fn default_rate_window() -> Duration {
    Duration::from_secs(600)
}

fn default_per_fingerprint_max() -> u64 {
    3
}

fn default_global_max() -> u64 {
    30
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_rate_window(),
            per_fingerprint_max: default_per_fingerprint_max(),
            global_max: default_global_max(),
        }
    }
}

/// Batching of non-critical incidents.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// How often the open batch is flushed.
    #[serde(
        default = "default_flush_period",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub flush_period_secs: Duration,

    /// Flush early once this many incidents are buffered.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_flush_period() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_max_entries() -> usize {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { flush_period_secs: default_flush_period(), max_entries: default_max_entries() }
    }
}

/// Daily digest schedule (UTC).
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DigestConfig {
    /// Whether the daily digest is scheduled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hour of day (0-23).
    #[serde(default = "default_digest_hour")]
    pub hour: u32,

    /// Minute of the hour (0-59).
    #[serde(default)]
    pub minute: u32,
}

fn default_true() -> bool {
    true
}

fn default_digest_hour() -> u32 {
    9
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self { enabled: true, hour: default_digest_hour(), minute: 0 }
    }
}

/// Periodic health checks.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Interval between two rounds of checks.
    #[serde(
        default = "default_health_interval",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub interval_secs: Duration,

    /// Upper bound for a single check.
    #[serde(
        default = "default_health_timeout",
        deserialize_with = "deserialize_duration_from_seconds"
    )]
    pub timeout_secs: Duration,
}

fn default_health_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { interval_secs: default_health_interval(), timeout_secs: default_health_timeout() }
    }
}

/// Incidents that are never reported.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Exception kinds dropped before dispatch.
    #[serde(default = "default_ignored_exceptions")]
    pub ignored_exceptions: Vec<String>,

    /// Location prefixes dropped before dispatch.
    #[serde(default = "default_ignored_paths")]
    pub ignored_paths: Vec<String>,
}

fn default_ignored_exceptions() -> Vec<String> {
    vec!["HTTPException".to_string(), "RequestValidationError".to_string()]
}

fn default_ignored_paths() -> Vec<String> {
    ["/health", "/metrics", "/static", "/docs", "/redoc", "/openapi.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignored_exceptions: default_ignored_exceptions(),
            ignored_paths: default_ignored_paths(),
        }
    }
}
