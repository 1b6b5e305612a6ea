//! Drops incidents that configuration says are never worth reporting.

use crate::{config::FilterConfig, models::IncidentEvent};

/// Filter for ignored exception kinds and location prefixes.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    ignored_exceptions: Vec<String>,
    ignored_paths: Vec<String>,
}

impl IncidentFilter {
    /// Builds the filter from configuration.
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            ignored_exceptions: config.ignored_exceptions.clone(),
            ignored_paths: config.ignored_paths.clone(),
        }
    }

    /// Returns the reason `event` is ignored, or `None` if it must be
    /// processed.
    pub fn ignore_reason(&self, event: &IncidentEvent) -> Option<&str> {
        let source = event.source();
        if let Some(kind) = self.ignored_exceptions.iter().find(|kind| **kind == source.kind) {
            return Some(kind);
        }
        self.ignored_paths
            .iter()
            .find(|prefix| source.location.starts_with(prefix.as_str()))
            .map(String::as_str)
    }
}
