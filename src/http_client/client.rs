//! This module creates the HTTP client used for deliveries.
//!
//! Retries are driven by the delivery channel itself so that server throttle
//! hints and attempt counts stay exact; the client carries no retry
//! middleware.

use std::sync::Arc;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::{config::BaseHttpClientConfig, delivery::DeliveryError};

/// Creates the pooled HTTP client for outbound deliveries.
pub fn create_http_client(
    config: &BaseHttpClientConfig,
) -> Result<Arc<ClientWithMiddleware>, DeliveryError> {
    let base_client = reqwest::Client::builder()
        .pool_max_idle_per_host(config.max_idle_per_host)
        .pool_idle_timeout(Some(config.idle_timeout))
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| DeliveryError::HttpClientBuildError(e.to_string()))?;

    Ok(Arc::new(ClientBuilder::new(base_client).build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_http_client_with_defaults() {
        assert!(create_http_client(&BaseHttpClientConfig::default()).is_ok());
    }
}
