use std::{net::SocketAddr, sync::Arc};

use beacon::{
    config::AppConfig,
    context::AppMetrics,
    delivery::DeliveryChannel,
    engine::Dispatcher,
    http_server::{self, ApiState},
    persistence::{MemoryStore, SharedStore},
    test_helpers::{create_test_channel, create_test_config},
};
use reqwest::Client;
use tokio::task;
use tokio_util::sync::CancellationToken;

pub const API_KEY: &str = "test-key";

pub struct TestServer {
    pub address: SocketAddr,
    pub server_handle: task::JoinHandle<()>,
    pub client: Client,
    pub app_metrics: AppMetrics,
    cancel: CancellationToken,
}

impl TestServer {
    /// Starts a server whose deliveries go to `telegram_url`.
    pub async fn new(telegram_url: &str, api_key: Option<&str>) -> Self {
        let config = create_test_config(telegram_url);
        let channel = create_test_channel(telegram_url);
        Self::start(config, Some(channel), api_key).await
    }

    /// Starts a server with monitoring switched off.
    pub async fn disabled() -> Self {
        let config = AppConfig::builder().enabled(false).build();
        Self::start(config, None, None).await
    }

    async fn start(
        mut config: AppConfig,
        channel: Option<DeliveryChannel>,
        api_key: Option<&str>,
    ) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get address");
        drop(listener); // Release port for the app to use

        config.server.listen_address = addr.to_string();
        config.server.api_key = api_key.map(String::from);

        let app_metrics = AppMetrics::default();
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            store,
            channel,
            Arc::clone(&app_metrics.pipeline),
        ));
        let state =
            ApiState { config: Arc::new(config), dispatcher, app_metrics: app_metrics.clone() };

        let cancel = CancellationToken::new();
        let server_cancel = cancel.clone();
        let server_handle = task::spawn(async move {
            http_server::run_server_from_config(state, server_cancel)
                .await
                .expect("Server failed");
        });

        // Wait for server to start
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        Self { address: addr, server_handle, client: Client::new(), app_metrics, cancel }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        self.client.get(&url).send().await.expect("Request failed")
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("http://{}{}", self.address, path);
        self.client.post(&url)
    }

    pub async fn cleanup(self) {
        self.cancel.cancel();
        let _ = self.server_handle.await;
    }
}
