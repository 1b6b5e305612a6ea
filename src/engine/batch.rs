//! Accumulation of non-critical incidents into periodic digests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::models::{Category, IncidentEvent, Severity, SourceIdentity};

#[derive(Debug, Default)]
struct OpenBatch {
    window_opened: Option<DateTime<Utc>>,
    entries: Vec<IncidentEvent>,
}

/// The buffer of one worker. Enqueue and flush hold the lock only for a push
/// or a swap, never across I/O.
#[derive(Debug)]
pub struct BatchAggregator {
    max_entries: usize,
    buffer: Mutex<OpenBatch>,
}

impl BatchAggregator {
    /// Creates an empty aggregator that reports itself full at `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries: max_entries.max(1), buffer: Mutex::default() }
    }

    fn lock(&self) -> MutexGuard<'_, OpenBatch> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `event` to the open batch. Returns `true` when the batch has
    /// reached its size cap and should be flushed right away.
    pub fn enqueue(&self, event: IncidentEvent) -> bool {
        let mut batch = self.lock();
        if batch.entries.is_empty() {
            batch.window_opened = Some(Utc::now());
        }
        batch.entries.push(event);
        batch.entries.len() >= self.max_entries
    }

    /// Swaps the open batch for an empty one. Returns `None` if nothing was
    /// buffered, so flushing twice in a row yields at most one digest.
    pub fn flush(&self) -> Option<BatchDigest> {
        let taken = std::mem::take(&mut *self.lock());
        if taken.entries.is_empty() {
            return None;
        }
        Some(BatchDigest {
            window_opened: taken.window_opened.unwrap_or_else(Utc::now),
            entries: taken.entries,
        })
    }

    /// Number of buffered incidents.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The entries swapped out by one flush, in insertion order.
#[derive(Debug, Clone)]
pub struct BatchDigest {
    /// When the first entry of this batch was enqueued.
    pub window_opened: DateTime<Utc>,
    /// Buffered incidents in the order they were enqueued.
    pub entries: Vec<IncidentEvent>,
}

impl BatchDigest {
    /// Entries grouped by category and source, in first-seen order, with
    /// their counts.
    pub fn groups(&self) -> Vec<(Category, SourceIdentity, usize)> {
        let mut groups: Vec<(Category, SourceIdentity, usize)> = Vec::new();
        for entry in &self.entries {
            match groups
                .iter_mut()
                .find(|(category, source, _)| *category == entry.category() && source == entry.source())
            {
                Some((_, _, count)) => *count += 1,
                None => groups.push((entry.category(), entry.source().clone(), 1)),
            }
        }
        groups
    }

    /// Builds the summary incident. Its severity is the highest among the
    /// entries.
    pub fn into_incident(self) -> IncidentEvent {
        let severity = self.entries.iter().map(IncidentEvent::severity).max().unwrap_or(Severity::Info);
        let groups = self.groups();
        let total = self.entries.len();

        let body = groups
            .iter()
            .map(|(category, source, count)| format!("{count}x {category} {source}"))
            .collect::<Vec<_>>()
            .join("\n");
        let group_details: Vec<Value> = groups
            .iter()
            .map(|(category, source, count)| {
                json!({
                    "category": category,
                    "location": source.location,
                    "kind": source.kind,
                    "count": count,
                })
            })
            .collect();
        let entry_details: Vec<Value> = self
            .entries
            .iter()
            .map(|entry| {
                json!({
                    "timestamp": entry.timestamp(),
                    "category": entry.category(),
                    "title": entry.title(),
                    "location": entry.source().location,
                })
            })
            .collect();

        IncidentEvent::new(
            Category::Digest,
            severity,
            SourceIdentity::new("batch", "digest"),
            format!("{total} incidents since {}", self.window_opened.format("%H:%M UTC")),
            body,
        )
        .with_detail("total", total)
        .with_detail("groups", group_details)
        .with_detail("entries", entry_details)
    }
}
