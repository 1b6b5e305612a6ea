//! Configuration module for the alerting pipeline.

mod app_config;
mod delivery;
mod helpers;
mod http_base;
mod pipeline;
mod server;
mod telegram;

pub use app_config::{AppConfig, AppConfigBuilder, ConfigurationError};
pub use delivery::{DeliveryMode, DeliveryRetryConfig, JitterSetting};
pub use helpers::{
    deserialize_chat_id, deserialize_duration_from_ms, deserialize_duration_from_seconds,
    serialize_duration_to_ms, serialize_duration_to_seconds,
};
pub use http_base::BaseHttpClientConfig;
pub use pipeline::{BatchConfig, DigestConfig, FilterConfig, HealthConfig, RateLimitConfig};
pub use server::ServerConfig;
pub use telegram::TelegramConfig;
