use serde::Deserialize;

use super::deserialize_chat_id;

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_max_message_length() -> usize {
    4000
}

/// Destination settings for the bot-style messaging endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Bot token used to build the `sendMessage` URL.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat or channel the alerts are posted to.
    #[serde(default, deserialize_with = "deserialize_chat_id")]
    pub chat_id: Option<String>,

    /// Optional forum topic used to group messages.
    #[serde(default)]
    pub thread_id: Option<i64>,

    /// Base URL of the bot API. Overridden in tests.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Whether link previews are suppressed in delivered messages.
    #[serde(default = "default_disable_web_preview")]
    pub disable_web_preview: bool,

    /// Messages longer than this many characters are truncated.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

fn default_disable_web_preview() -> bool {
    true
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            thread_id: None,
            api_base_url: default_api_base_url(),
            disable_web_preview: default_disable_web_preview(),
            max_message_length: default_max_message_length(),
        }
    }
}
