//! The outbound message and its rendering for the bot API.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    config::TelegramConfig,
    models::{Category, IncidentEvent, Severity},
};

/// A prepared message, ready to be rendered for the endpoint. Pre-send
/// transforms operate on this value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// Category of the incident the message reports.
    pub category: Category,
    /// Severity, rendered as a marker before the title.
    pub severity: Severity,
    /// Headline.
    pub title: String,
    /// Free-form body text.
    pub body: String,
    /// Deployment environment, e.g. `production`.
    pub environment: String,
    /// Structured details rendered as `key: value` lines.
    pub details: BTreeMap<String, Value>,
}

impl OutboundMessage {
    /// Prepares `event` for delivery from the given environment.
    pub fn from_incident(event: &IncidentEvent, environment: &str) -> Self {
        let mut details = event.details().clone();
        if !event.source().location.is_empty() && event.category() != Category::Digest {
            details
                .entry("location".to_string())
                .or_insert_with(|| Value::String(event.source().location.clone()));
        }
        Self {
            category: event.category(),
            severity: event.severity(),
            title: event.title().to_string(),
            body: event.message().to_string(),
            environment: environment.to_string(),
            details,
        }
    }

    /// Renders the plain-text message, cut to at most `max_chars` characters.
    pub fn render_text(&self, max_chars: usize) -> String {
        let mut text = format!("{} {}", self.severity.marker(), self.title);
        text.push_str(&format!("\n[{}] {}", self.environment, self.severity.label()));
        if !self.body.is_empty() {
            text.push_str("\n\n");
            text.push_str(&self.body);
        }

        let detail_lines: Vec<String> = self
            .details
            .iter()
            // Digest entry lists are already summarized in the body.
            .filter(|(_, value)| !value.is_array() && !value.is_object())
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}: {s}"),
                other => format!("{key}: {other}"),
            })
            .collect();
        if !detail_lines.is_empty() {
            text.push_str("\n\n");
            text.push_str(&detail_lines.join("\n"));
        }

        truncate_chars(text, max_chars)
    }

    /// Builds the `sendMessage` request body.
    pub fn telegram_payload(&self, config: &TelegramConfig) -> Value {
        let mut payload = json!({
            "chat_id": config.chat_id,
            "text": self.render_text(config.max_message_length),
            "disable_web_page_preview": config.disable_web_preview,
        });
        if let Some(thread_id) = config.thread_id {
            payload["message_thread_id"] = json!(thread_id);
        }
        payload
    }
}

/// Cuts `text` to `max_chars` characters, marking the cut with an ellipsis.
fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let keep = max_chars.saturating_sub(1);
    let mut truncated: String = text.chars().take(keep).collect();
    if max_chars > 0 {
        truncated.push('…');
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_marker_env_body_and_details() {
        let event = IncidentEvent::error("/orders", "KeyError", "missing 'id'").with_detail("user_id", 42);
        let message = OutboundMessage::from_incident(&event, "production");

        let text = message.render_text(4000);
        assert_eq!(
            text,
            "🔴 KeyError\n[production] CRITICAL\n\nmissing 'id'\n\nlocation: /orders\nuser_id: 42"
        );
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let event = IncidentEvent::error("/x", "É", "ééééééééééééééééééé");
        let text = OutboundMessage::from_incident(&event, "dev").render_text(10);
        assert_eq!(text.chars().count(), 10);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn test_payload_has_thread_id_only_when_configured() {
        let message = OutboundMessage::from_incident(&IncidentEvent::health("db", "timeout"), "dev");
        let mut config = TelegramConfig {
            chat_id: Some("-100123".to_string()),
            ..Default::default()
        };

        let payload = message.telegram_payload(&config);
        assert_eq!(payload["chat_id"], "-100123");
        assert_eq!(payload["disable_web_page_preview"], true);
        assert!(payload.get("message_thread_id").is_none());

        config.thread_id = Some(7);
        assert_eq!(message.telegram_payload(&config)["message_thread_id"], 7);
    }
}
