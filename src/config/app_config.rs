use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use super::{
    BaseHttpClientConfig, BatchConfig, DeliveryMode, DeliveryRetryConfig, DigestConfig,
    FilterConfig, HealthConfig, RateLimitConfig, ServerConfig, TelegramConfig,
    deserialize_duration_from_seconds,
};

/// Provides the default value for shutdown_timeout_secs.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for dedup_ttl_secs.
fn default_dedup_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_enabled() -> bool {
    true
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_database_url() -> String {
    "sqlite://beacon.db".to_string()
}

fn default_key_prefix() -> String {
    "monitoring".to_string()
}

/// Errors raised while loading or validating the configuration. These are
/// fatal: the pipeline refuses to start rather than silently drop alerts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A setting required for delivery is absent.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting is present but outside its allowed range.
    #[error("Invalid setting `{field}`: {reason}")]
    Invalid {
        /// Name of the offending setting.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Application configuration, constructed once at startup and handed to
/// every component by reference.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Master switch. A disabled pipeline accepts incidents and drops them.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Environment name shown in every message (development, production...).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// URL of the shared store: a SQLite URL for workers on one host, or a
    /// `redis://` URL for workers on several hosts.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Namespace prepended to every shared-store key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Delivery endpoint settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// How long a delivered fingerprint suppresses identical incidents.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_dedup_ttl"
    )]
    pub dedup_ttl_secs: Duration,

    /// Per-fingerprint and global rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Batching of non-critical incidents.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Retry policy of the delivery channel.
    #[serde(default)]
    pub delivery: DeliveryRetryConfig,

    /// Background (fire-and-forget) or synchronous delivery.
    #[serde(default)]
    pub delivery_mode: DeliveryMode,

    /// Daily digest schedule.
    #[serde(default)]
    pub digest: DigestConfig,

    /// Health check cadence.
    #[serde(default)]
    pub health: HealthConfig,

    /// Incidents that are never reported.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Configuration for the base HTTP client.
    #[serde(default)]
    pub http_base_config: BaseHttpClientConfig,

    /// Ingestion server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// The maximum time to wait for in-flight deliveries on shutdown.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout_secs: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            environment: default_environment(),
            database_url: default_database_url(),
            key_prefix: default_key_prefix(),
            telegram: TelegramConfig::default(),
            dedup_ttl_secs: default_dedup_ttl(),
            rate_limit: RateLimitConfig::default(),
            batch: BatchConfig::default(),
            delivery: DeliveryRetryConfig::default(),
            delivery_mode: DeliveryMode::default(),
            digest: DigestConfig::default(),
            health: HealthConfig::default(),
            filters: FilterConfig::default(),
            http_base_config: BaseHttpClientConfig::default(),
            server: ServerConfig::default(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl AppConfig {
    /// Loads `<config_dir>/app.yaml` (optional) and applies `MONITORING__*`
    /// environment overrides, then validates the result.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigurationError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)).required(false))
            .add_source(Environment::with_prefix("MONITORING").separator("__").try_parsing(true))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Returns `true` for production-like environment names.
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.enabled {
            if !self.telegram.bot_token.as_deref().is_some_and(|t| !t.is_empty()) {
                return Err(ConfigurationError::Missing("telegram.bot_token"));
            }
            if self.telegram.chat_id.is_none() {
                return Err(ConfigurationError::Missing("telegram.chat_id"));
            }
        }

        let positive = [
            ("dedup_ttl_secs", self.dedup_ttl_secs),
            ("rate_limit.window_secs", self.rate_limit.window_secs),
            ("batch.flush_period_secs", self.batch.flush_period_secs),
            ("health.interval_secs", self.health.interval_secs),
        ];
        for (field, value) in positive {
            if value.is_zero() {
                return Err(ConfigurationError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.rate_limit.per_fingerprint_max == 0 || self.rate_limit.global_max == 0 {
            return Err(ConfigurationError::Invalid {
                field: "rate_limit",
                reason: "caps must be at least 1".to_string(),
            });
        }
        if self.batch.max_entries == 0 {
            return Err(ConfigurationError::Invalid {
                field: "batch.max_entries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.delivery.max_attempts == 0 {
            return Err(ConfigurationError::Invalid {
                field: "delivery.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.delivery.initial_backoff_ms > self.delivery.max_backoff_secs {
            return Err(ConfigurationError::Invalid {
                field: "delivery.initial_backoff_ms",
                reason: "must not exceed delivery.max_backoff_secs".to_string(),
            });
        }
        if chrono::NaiveTime::from_hms_opt(self.digest.hour, self.digest.minute, 0).is_none() {
            return Err(ConfigurationError::Invalid {
                field: "digest",
                reason: format!(
                    "{:02}:{:02} is not a valid time of day",
                    self.digest.hour, self.digest.minute
                ),
            });
        }
        Ok(())
    }

    /// Creates a new `AppConfigBuilder` for testing purposes.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

/// A builder for creating `AppConfig` instances in tests.
#[allow(missing_docs)]
#[derive(Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[allow(missing_docs)]
impl AppConfigBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn environment(mut self, environment: &str) -> Self {
        self.config.environment = environment.to_string();
        self
    }

    pub fn telegram(mut self, api_base_url: &str, bot_token: &str, chat_id: &str) -> Self {
        self.config.telegram.api_base_url = api_base_url.to_string();
        self.config.telegram.bot_token = Some(bot_token.to_string());
        self.config.telegram.chat_id = Some(chat_id.to_string());
        self
    }

    pub fn dedup_ttl(mut self, ttl: Duration) -> Self {
        self.config.dedup_ttl_secs = ttl;
        self
    }

    pub fn rate_limit(mut self, window: Duration, per_fingerprint_max: u64, global_max: u64) -> Self {
        self.config.rate_limit = RateLimitConfig { window_secs: window, per_fingerprint_max, global_max };
        self
    }

    pub fn batch(mut self, flush_period: Duration, max_entries: usize) -> Self {
        self.config.batch = BatchConfig { flush_period_secs: flush_period, max_entries };
        self
    }

    pub fn delivery(mut self, delivery: DeliveryRetryConfig) -> Self {
        self.config.delivery = delivery;
        self
    }

    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.config.delivery_mode = mode;
        self
    }

    pub fn digest(mut self, hour: u32, minute: u32) -> Self {
        self.config.digest = DigestConfig { enabled: true, hour, minute };
        self
    }

    pub fn filters(mut self, ignored_exceptions: &[&str], ignored_paths: &[&str]) -> Self {
        self.config.filters = FilterConfig {
            ignored_exceptions: ignored_exceptions.iter().map(|s| s.to_string()).collect(),
            ignored_paths: ignored_paths.iter().map(|s| s.to_string()).collect(),
        };
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
