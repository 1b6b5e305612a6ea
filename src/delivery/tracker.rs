//! Lifetime management for fire-and-forget deliveries.
//!
//! Every spawned send is registered in a live set and removes itself when it
//! reaches a terminal state, whatever that state is. The set therefore never
//! holds more entries than there are sends in flight.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use serde::Serialize;
use tokio::{sync::watch, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::channel::{DeliveryOutcome, FailureKind};
use crate::{config::DeliveryMode, context::PipelineMetrics};

/// Lifecycle of a tracked delivery. Once terminal, it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskStatus {
    /// Still running.
    Pending,
    /// Delivered after `attempts` calls.
    Succeeded {
        /// Outbound calls made.
        attempts: u32,
    },
    /// Given up on.
    Failed {
        /// Failure classification.
        kind: FailureKind,
        /// Outbound calls made.
        attempts: u32,
    },
    /// Cancelled at shutdown before completing.
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` for every state except [`TaskStatus::Pending`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl From<DeliveryOutcome> for TaskStatus {
    fn from(outcome: DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Delivered { attempts } => TaskStatus::Succeeded { attempts },
            DeliveryOutcome::Failed { kind, attempts } => TaskStatus::Failed { kind, attempts },
        }
    }
}

/// Handle to a tracked delivery. Dropping it does not cancel the delivery.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    status: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    /// Identifier of the task within its tracker.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The current status.
    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    /// Waits for the task to reach a terminal state.
    pub async fn wait(&self) -> TaskStatus {
        let mut status = self.status.clone();
        match status.wait_for(TaskStatus::is_terminal).await {
            Ok(terminal) => *terminal,
            // The task was dropped without reporting, i.e. the runtime shut down.
            Err(_) => TaskStatus::Cancelled,
        }
    }
}

/// Summary of a shutdown drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// `true` if every task finished before the timeout.
    pub completed: bool,
    /// Tasks cancelled because the timeout elapsed.
    pub abandoned: usize,
}

/// Removes a task from the live set when dropped, so that panics and
/// cancellations deregister as reliably as normal completion.
struct LiveGuard {
    id: u64,
    live: Arc<DashMap<u64, Instant>>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.remove(&self.id);
    }
}

/// Owns all in-flight deliveries of the process.
pub struct DeliveryTracker {
    mode: DeliveryMode,
    tracker: TaskTracker,
    cancel: CancellationToken,
    live: Arc<DashMap<u64, Instant>>,
    next_id: AtomicU64,
    metrics: Arc<PipelineMetrics>,
}

impl DeliveryTracker {
    /// Creates an empty tracker.
    pub fn new(mode: DeliveryMode, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            mode,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            live: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            metrics,
        }
    }

    /// The configured delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Starts `operation`. In background mode this returns immediately; in
    /// synchronous mode it returns once the operation is terminal.
    pub async fn spawn<F>(&self, operation: F) -> TaskHandle
    where
        F: Future<Output = DeliveryOutcome> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status_rx) = watch::channel(TaskStatus::Pending);
        self.live.insert(id, Instant::now());
        let guard = LiveGuard { id, live: Arc::clone(&self.live) };
        let cancel = self.cancel.clone();

        let task = async move {
            let status = tokio::select! {
                outcome = operation => TaskStatus::from(outcome),
                _ = cancel.cancelled() => TaskStatus::Cancelled,
            };
            // Deregister before publishing, so a waiter never sees a terminal
            // task still counted as live.
            drop(guard);
            status_tx.send_replace(status);
        };

        match self.mode {
            DeliveryMode::Synchronous => task.await,
            DeliveryMode::Background => {
                self.tracker.spawn(task);
            }
        }
        TaskHandle { id, status: status_rx }
    }

    /// Number of deliveries currently in flight.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Waits up to `timeout` for every in-flight delivery. Deliveries still
    /// running afterwards are cancelled and counted as abandoned.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        self.tracker.close();
        let in_flight = self.live_count();
        tracing::info!(in_flight, timeout_secs = timeout.as_secs(), "Draining deliveries...");

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            tracing::info!("All deliveries completed.");
            return DrainReport { completed: true, abandoned: 0 };
        }

        let abandoned = self.live_count();
        for entry in self.live.iter() {
            tracing::warn!(
                task_id = *entry.key(),
                age_ms = entry.value().elapsed().as_millis() as u64,
                "Abandoning in-flight delivery."
            );
        }
        self.metrics.record_abandoned_many(abandoned as u64);
        self.cancel.cancel();
        // Cancelled tasks finish at their next poll.
        if tokio::time::timeout(Duration::from_secs(1), self.tracker.wait()).await.is_err() {
            tracing::error!("Cancelled deliveries did not stop in time.");
        }
        tracing::warn!(abandoned, "Drain timed out.");
        DrainReport { completed: false, abandoned }
    }
}
