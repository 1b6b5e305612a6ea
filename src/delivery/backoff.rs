//! Delay computation between delivery attempts.

use std::time::{Duration, SystemTime};

use reqwest_retry::{Jitter, RetryDecision, RetryPolicy, policies::ExponentialBackoff};

use crate::config::{DeliveryRetryConfig, JitterSetting};

/// Exponential backoff bounded by a maximum number of attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_attempts: u32,
    policy: ExponentialBackoff,
}

impl Backoff {
    /// Builds the policy from the delivery retry settings.
    pub fn new(config: &DeliveryRetryConfig) -> Self {
        let policy_builder = match config.jitter {
            JitterSetting::None => ExponentialBackoff::builder().jitter(Jitter::None),
            JitterSetting::Full => ExponentialBackoff::builder().jitter(Jitter::Full),
        };
        let policy = policy_builder
            .base(config.base_for_backoff)
            .retry_bounds(config.initial_backoff_ms, config.max_backoff_secs)
            .build_with_max_retries(config.max_attempts.saturating_sub(1));

        Self { max_attempts: config.max_attempts.max(1), policy }
    }

    /// Total number of calls allowed for one message.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The delay before the next attempt after `attempts_made` calls have
    /// failed, or `None` if the attempt budget is spent. A server hint is used
    /// verbatim in place of the computed delay.
    pub fn next_delay(&self, attempts_made: u32, server_hint: Option<Duration>) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            return None;
        }
        if let Some(hint) = server_hint {
            return Some(hint);
        }
        match self.policy.should_retry(SystemTime::now(), attempts_made.saturating_sub(1)) {
            RetryDecision::Retry { execute_after } => {
                Some(execute_after.duration_since(SystemTime::now()).unwrap_or_default())
            }
            RetryDecision::DoNotRetry => None,
        }
    }
}
