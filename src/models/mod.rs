//! This module contains the data models shared across the pipeline.

pub mod incident;
pub mod stats;

pub use incident::{Category, IncidentEvent, Severity, SourceIdentity};
pub use stats::{DailyStats, StatsPeriod};
