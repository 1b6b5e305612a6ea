use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{Category, IncidentEvent, Severity, SourceIdentity};

/// A builder for creating `IncidentEvent` instances for testing.
pub struct IncidentBuilder {
    category: Category,
    severity: Severity,
    location: String,
    kind: String,
    title: String,
    message: String,
    timestamp: Option<DateTime<Utc>>,
    details: Vec<(String, Value)>,
}

impl Default for IncidentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentBuilder {
    /// Creates a critical `error` incident on `/test` of kind `TestError`.
    pub fn new() -> Self {
        Self {
            category: Category::Error,
            severity: Severity::Critical,
            location: "/test".to_string(),
            kind: "TestError".to_string(),
            title: "Test incident".to_string(),
            message: String::new(),
            timestamp: None,
            details: Vec::new(),
        }
    }

    /// Sets the category.
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Sets the severity.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the source location.
    pub fn location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    /// Sets the source kind.
    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    /// Sets the title.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Sets the message body.
    pub fn message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    /// Sets an explicit timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Adds a detail entry.
    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.push((key.to_string(), value.into()));
        self
    }

    /// Builds the `IncidentEvent`.
    pub fn build(self) -> IncidentEvent {
        let mut event = IncidentEvent::new(
            self.category,
            self.severity,
            SourceIdentity::new(self.location, self.kind),
            self.title,
            self.message,
        );
        if let Some(timestamp) = self.timestamp {
            event = event.at(timestamp);
        }
        for (key, value) in self.details {
            event = event.with_detail(key, value);
        }
        event
    }
}
