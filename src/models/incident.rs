//! The incident event reported by the instrumented application.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of occurrence an incident describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// An unhandled exception.
    Error,
    /// A request that exceeded the latency threshold.
    SlowRequest,
    /// A failed health check.
    Health,
    /// A summary of other incidents (batch flush or daily report).
    Digest,
}

impl Category {
    /// All categories, in reporting order.
    pub const ALL: [Category; 4] =
        [Category::Error, Category::SlowRequest, Category::Health, Category::Digest];

    /// Stable identifier used in fingerprints and store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Error => "error",
            Category::SlowRequest => "slow_request",
            Category::Health => "health",
            Category::Digest => "digest",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently an incident must reach a human.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Batched or reported in the daily digest.
    #[default]
    Info,
    /// Batched and flushed on the batch cadence.
    Warning,
    /// Delivered immediately.
    Critical,
}

impl Severity {
    /// Marker prepended to the message title.
    pub fn marker(&self) -> &'static str {
        match self {
            Severity::Critical => "🔴",
            Severity::Warning => "🟡",
            Severity::Info => "🔵",
        }
    }

    /// Upper-case label used in rendered messages.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

/// Where an incident came from: a location (route, task or check name) and a
/// kind (exception type, check type). Together with the category this is the
/// logical identity used for deduplication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceIdentity {
    /// Route, task or check the incident originates from.
    pub location: String,
    /// Exception type or failure kind.
    #[serde(default)]
    pub kind: String,
}

impl SourceIdentity {
    /// Creates a new source identity.
    pub fn new(location: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { location: location.into(), kind: kind.into() }
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            write!(f, "{}", self.location)
        } else {
            write!(f, "{} at {}", self.kind, self.location)
        }
    }
}

/// A single reportable occurrence. Immutable once created: fields are only
/// readable through accessors and the builder-style methods consume `self`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentEvent {
    category: Category,
    #[serde(default)]
    severity: Severity,
    source: SourceIdentity,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: BTreeMap<String, Value>,
}

impl IncidentEvent {
    /// Creates an incident stamped with the current time.
    pub fn new(
        category: Category,
        severity: Severity,
        source: SourceIdentity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            source,
            timestamp: Utc::now(),
            title: title.into(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// An unhandled exception on `route`. Always critical.
    pub fn error(
        route: impl Into<String>,
        exception_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let exception_type = exception_type.into();
        Self::new(
            Category::Error,
            Severity::Critical,
            SourceIdentity::new(route, exception_type.clone()),
            exception_type,
            message,
        )
    }

    /// A request on `route` that took `elapsed_secs`. Reported as a warning.
    pub fn slow_request(route: impl Into<String>, method: &str, elapsed_secs: f64) -> Self {
        let route = route.into();
        Self::new(
            Category::SlowRequest,
            Severity::Warning,
            SourceIdentity::new(route.clone(), method.to_uppercase()),
            format!("Slow request {} {}", method.to_uppercase(), route),
            format!("Request took {elapsed_secs:.2}s"),
        )
        .with_detail("elapsed_secs", elapsed_secs)
    }

    /// A failed health check. Always critical.
    pub fn health(check: impl Into<String>, reason: impl Into<String>) -> Self {
        let check = check.into();
        Self::new(
            Category::Health,
            Severity::Critical,
            SourceIdentity::new(check.clone(), "unhealthy"),
            format!("Health check failed: {check}"),
            reason,
        )
    }

    /// Returns the incident with one more detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns the incident with an explicit timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the incident with a different severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// The incident category.
    pub fn category(&self) -> Category {
        self.category
    }

    /// The incident severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Where the incident came from.
    pub fn source(&self) -> &SourceIdentity {
        &self.source
    }

    /// When the incident happened.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Short human-readable headline.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Raw message body.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Free-form structured details.
    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }
}
