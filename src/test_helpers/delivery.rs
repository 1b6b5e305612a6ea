use std::time::Duration;

use crate::{
    config::{AppConfig, DeliveryMode, DeliveryRetryConfig, JitterSetting},
    delivery::DeliveryChannel,
    http_client::create_http_client,
};

/// Bot token used by test channels. Requests go to `/botTEST_TOKEN/sendMessage`.
pub const TEST_TOKEN: &str = "TEST_TOKEN";

/// A retry policy with three attempts and millisecond backoff.
pub fn fast_retry_config() -> DeliveryRetryConfig {
    DeliveryRetryConfig {
        max_attempts: 3,
        initial_backoff_ms: Duration::from_millis(10),
        max_backoff_secs: Duration::from_millis(50),
        jitter: JitterSetting::None,
        attempt_timeout_secs: Duration::from_secs(5),
        ..DeliveryRetryConfig::default()
    }
}

/// A synchronous configuration pointing at `server_url` with fast retries.
pub fn create_test_config(server_url: &str) -> AppConfig {
    AppConfig::builder()
        .environment("test")
        .telegram(server_url, TEST_TOKEN, "-100123")
        .delivery(fast_retry_config())
        .delivery_mode(DeliveryMode::Synchronous)
        .build()
}

/// Creates a delivery channel that posts to `server_url`.
pub fn create_test_channel(server_url: &str) -> DeliveryChannel {
    let config = create_test_config(server_url);
    let client = create_http_client(&config.http_base_config).unwrap();
    DeliveryChannel::new(&config.telegram, &config.delivery, client).unwrap()
}
