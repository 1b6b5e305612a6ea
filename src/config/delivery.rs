use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};

fn default_max_attempts() -> u32 {
    3
}

fn default_base_for_backoff() -> u32 {
    2
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Serializable setting for jitter in retry policies
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JitterSetting {
    /// No jitter applied to the backoff duration
    None,
    /// Full jitter applied, randomizing the backoff duration
    #[default]
    Full,
}

/// Retry and timeout policy for outbound deliveries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeliveryRetryConfig {
    /// Total number of outbound calls allowed for one message, including the
    /// first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff.
    #[serde(default = "default_base_for_backoff")]
    pub base_for_backoff: u32,

    /// Delay before the first retry.
    #[serde(
        default = "default_initial_backoff",
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub initial_backoff_ms: Duration,

    /// Upper bound for computed delays. A server-provided throttle hint is
    /// not clamped by this value.
    #[serde(
        default = "default_max_backoff",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub max_backoff_secs: Duration,

    /// Jitter to apply to the computed backoff.
    #[serde(default)]
    pub jitter: JitterSetting,

    /// Timeout for a single outbound call. Exceeding it counts as a
    /// retryable fault.
    #[serde(
        default = "default_attempt_timeout",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub attempt_timeout_secs: Duration,
}

impl Default for DeliveryRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_for_backoff: default_base_for_backoff(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            jitter: JitterSetting::default(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

/// Whether deliveries run in the background or complete before the caller
/// proceeds.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Fire-and-forget: sends are spawned and tracked.
    #[default]
    Background,
    /// Sends are awaited inline. Meant for tests and debugging.
    Synchronous,
}
