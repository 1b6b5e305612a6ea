//! Reliable sending of one message to the bot API.

use std::{sync::Arc, time::Duration};

use reqwest::{StatusCode, header::HeaderMap};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{Retryable, default_on_request_failure, default_on_request_success};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{backoff::Backoff, error::DeliveryError, message::OutboundMessage};
use crate::config::{DeliveryRetryConfig, TelegramConfig};

/// Why a message could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The endpoint rejected the message; it was not retried.
    Permanent,
    /// Every allowed attempt hit a transient fault.
    RetryableExhausted,
}

/// Terminal result of [`DeliveryChannel::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DeliveryOutcome {
    /// A 2xx response was received.
    Delivered {
        /// Outbound calls made, including the successful one.
        attempts: u32,
    },
    /// The message was given up on.
    Failed {
        /// Permanent rejection or exhausted retries.
        kind: FailureKind,
        /// Outbound calls made.
        attempts: u32,
    },
}

impl DeliveryOutcome {
    /// Returns `true` for [`DeliveryOutcome::Delivered`].
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Number of outbound calls made.
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// 2xx.
    Delivered,
    /// 5xx, 429, timeout or network error.
    Retryable {
        /// Human-readable cause.
        reason: String,
        /// Delay requested by the server, if any.
        retry_after: Option<Duration>,
    },
    /// Any other rejection.
    Permanent {
        /// Human-readable cause.
        reason: String,
    },
}

/// Passed to the post-attempt observer after every outbound call.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// 1-based attempt number.
    pub attempt: u32,
    /// How the attempt ended.
    pub result: AttemptResult,
}

/// Rewrites a message right before it is sent, e.g. to scrub sensitive
/// details.
pub type PreSendTransform = Arc<dyn Fn(OutboundMessage) -> OutboundMessage + Send + Sync>;

/// Called after every attempt, successful or not.
pub type AttemptObserver = Arc<dyn Fn(&AttemptReport) + Send + Sync>;

/// Error body returned by the bot API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiErrorParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Sends messages with bounded retries and exponential backoff.
#[derive(Clone)]
pub struct DeliveryChannel {
    client: Arc<ClientWithMiddleware>,
    endpoint: Url,
    telegram: TelegramConfig,
    attempt_timeout: Duration,
    backoff: Backoff,
    transform: Option<PreSendTransform>,
    observer: Option<AttemptObserver>,
}

impl std::fmt::Debug for DeliveryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The endpoint path embeds the bot token.
        f.debug_struct("DeliveryChannel")
            .field("host", &self.endpoint.host_str())
            .field("max_attempts", &self.backoff.max_attempts())
            .finish_non_exhaustive()
    }
}

impl DeliveryChannel {
    /// Creates a channel posting to `{api_base_url}/bot{token}/sendMessage`.
    pub fn new(
        telegram: &TelegramConfig,
        retry: &DeliveryRetryConfig,
        client: Arc<ClientWithMiddleware>,
    ) -> Result<Self, DeliveryError> {
        let token = telegram
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(DeliveryError::MissingCredentials("telegram.bot_token"))?;
        if telegram.chat_id.is_none() {
            return Err(DeliveryError::MissingCredentials("telegram.chat_id"));
        }
        let endpoint = Url::parse(&format!(
            "{}/bot{}/sendMessage",
            telegram.api_base_url.trim_end_matches('/'),
            token
        ))?;

        Ok(Self {
            client,
            endpoint,
            telegram: telegram.clone(),
            attempt_timeout: retry.attempt_timeout_secs,
            backoff: Backoff::new(retry),
            transform: None,
            observer: None,
        })
    }

    /// Installs a transform applied to every message before it is sent.
    pub fn with_transform(mut self, transform: PreSendTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Installs an observer notified after every attempt.
    pub fn with_observer(mut self, observer: AttemptObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The retry policy of this channel.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Sends `message`, retrying transient faults until the attempt budget is
    /// spent. Every attempt is exactly one outbound call.
    pub async fn send(&self, message: OutboundMessage) -> DeliveryOutcome {
        let message = match &self.transform {
            Some(transform) => transform(message),
            None => message,
        };
        let payload = message.telegram_payload(&self.telegram);

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self.attempt(&payload).await;
            if let Some(observer) = &self.observer {
                observer(&AttemptReport { attempt: attempts, result: result.clone() });
            }

            match result {
                AttemptResult::Delivered => {
                    tracing::debug!(attempts, title = %message.title, "Message delivered.");
                    return DeliveryOutcome::Delivered { attempts };
                }
                AttemptResult::Permanent { reason } => {
                    tracing::error!(
                        attempts,
                        title = %message.title,
                        reason = %reason,
                        "Delivery rejected by endpoint, not retrying."
                    );
                    return DeliveryOutcome::Failed { kind: FailureKind::Permanent, attempts };
                }
                AttemptResult::Retryable { reason, retry_after } => {
                    match self.backoff.next_delay(attempts, retry_after) {
                        Some(delay) => {
                            tracing::warn!(
                                attempts,
                                reason = %reason,
                                delay_ms = delay.as_millis() as u64,
                                "Delivery attempt failed, retrying."
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(
                                attempts,
                                title = %message.title,
                                reason = %reason,
                                "Delivery retries exhausted."
                            );
                            return DeliveryOutcome::Failed {
                                kind: FailureKind::RetryableExhausted,
                                attempts,
                            };
                        }
                    }
                }
            }
        }
    }

    /// Makes one outbound call under the attempt timeout and classifies it.
    /// The timeout covers the whole exchange, including reading an error body.
    async fn attempt(&self, payload: &serde_json::Value) -> AttemptResult {
        match tokio::time::timeout(self.attempt_timeout, self.call(payload)).await {
            Ok(result) => result,
            Err(_) => AttemptResult::Retryable {
                reason: format!("timed out after {:?}", self.attempt_timeout),
                retry_after: None,
            },
        }
    }

    async fn call(&self, payload: &serde_json::Value) -> AttemptResult {
        let response = match self.client.post(self.endpoint.clone()).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                return match default_on_request_failure(&e) {
                    Some(Retryable::Fatal) => AttemptResult::Permanent { reason: e.to_string() },
                    _ => AttemptResult::Retryable { reason: e.to_string(), retry_after: None },
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            return AttemptResult::Delivered;
        }

        // Only 429 among client errors is worth another attempt.
        let classification = if status == StatusCode::REQUEST_TIMEOUT {
            Some(Retryable::Fatal)
        } else {
            default_on_request_success(&response)
        };
        let header_hint = retry_after_header(response.headers());
        let body = response.text().await.unwrap_or_default();
        let api_error = serde_json::from_str::<ApiErrorBody>(&body).ok();
        let reason = match api_error.as_ref().and_then(|b| b.description.as_deref()) {
            Some(description) => format!("{status}: {description}"),
            None => status.to_string(),
        };

        match classification {
            Some(Retryable::Transient) => {
                let retry_after = header_hint.or_else(|| {
                    api_error
                        .and_then(|b| b.parameters)
                        .and_then(|p| p.retry_after)
                        .map(Duration::from_secs)
                });
                AttemptResult::Retryable { reason, retry_after }
            }
            _ => AttemptResult::Permanent { reason },
        }
    }
}

/// Parses a `Retry-After` header given in seconds.
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
