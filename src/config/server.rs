use serde::Deserialize;

/// Configuration for the incident ingestion server.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Whether the ingestion server is started by the supervisor.
    #[serde(default)]
    pub enabled: bool,

    /// Address and port for the HTTP server to listen on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Optional bearer token required on `POST /incidents`.
    /// If not set in config, falls back to `BEACON_API_KEY` env var.
    #[serde(default = "default_api_key_from_env")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { enabled: false, listen_address: default_listen_address(), api_key: None }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_key_from_env() -> Option<String> {
    std::env::var("BEACON_API_KEY").ok().filter(|key| !key.is_empty())
}
