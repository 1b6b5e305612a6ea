//! Once-a-day summary report.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::{
    models::{Category, DailyStats, IncidentEvent, Severity, SourceIdentity, StatsPeriod},
    providers::{StatsError, StatsProvider},
};

/// Lifetime of the "already sent today" marker. Longer than a day so that
/// a late fire on the next day cannot reuse it.
const DAY_MARKER_TTL: Duration = Duration::from_secs(26 * 60 * 60);

/// The first instant strictly after `now` at `hour:minute` UTC.
pub fn next_fire_after(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now { today } else { today + TimeDelta::days(1) }
}

/// Result of one scheduler fire.
#[derive(Debug)]
pub enum DigestFire {
    /// Another worker (or an earlier fire) already sent today's digest.
    AlreadySent,
    /// The digest was routed to delivery.
    Sent(DispatchOutcome),
}

/// Fires the daily digest at a fixed UTC time of day.
pub struct DigestScheduler {
    dispatcher: Arc<Dispatcher>,
    stats: Option<Arc<dyn StatsProvider>>,
    hour: u32,
    minute: u32,
}

impl DigestScheduler {
    /// Creates a scheduler firing at `hour:minute` UTC.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        stats: Option<Arc<dyn StatsProvider>>,
        hour: u32,
        minute: u32,
    ) -> Self {
        Self { dispatcher, stats, hour, minute }
    }

    /// Sleeps until each fire time and fires, until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            let now = Utc::now();
            let next = next_fire_after(now, self.hour, self.minute);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next_fire = %next, "Daily digest scheduled.");

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Digest scheduler received shutdown signal.");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    self.fire_once(next).await;
                }
            }
        }
    }

    /// Assembles and routes the digest for the day ending at `now`, unless it
    /// was already sent today.
    pub async fn fire_once(&self, now: DateTime<Utc>) -> DigestFire {
        let day = now.date_naive();
        let marker = format!(
            "{}:digest:daily:{}",
            self.dispatcher.key_prefix(),
            day.format("%Y-%m-%d")
        );
        match self.dispatcher.store().conditional_create(&marker, DAY_MARKER_TTL).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(%day, "Daily digest already sent.");
                return DigestFire::AlreadySent;
            }
            Err(e) => {
                self.dispatcher.metrics().record_store_degraded();
                tracing::warn!(error = %e, "Digest marker unavailable, sending anyway.");
            }
        }

        let stats = self.collect(now).await;
        let outcome = self.dispatcher.handle(digest_incident(&stats, now)).await;
        tracing::info!(outcome = outcome.kind(), "Daily digest fired.");
        DigestFire::Sent(outcome)
    }

    /// Builds a fresh snapshot for the 24 whole hours before `now`. Failing
    /// counters are left out.
    async fn collect(&self, now: DateTime<Utc>) -> DailyStats {
        let period = StatsPeriod::last_day_aligned(now);
        let mut stats = DailyStats {
            period,
            new_users: None,
            active_users: None,
            total_users: None,
            new_projects: None,
            updated_projects: None,
            total_projects: None,
            incidents_by_category: self.dispatcher.incident_counts(&period).await,
        };

        let Some(provider) = &self.stats else {
            return stats;
        };
        stats.new_users = omit_on_error("new_users", provider.new_users(&period).await);
        stats.active_users = omit_on_error("active_users", provider.active_users(&period).await);
        stats.total_users = omit_on_error("total_users", provider.total_users().await);
        stats.new_projects = omit_on_error("new_projects", provider.new_projects(&period).await);
        stats.updated_projects =
            omit_on_error("updated_projects", provider.updated_projects(&period).await);
        stats.total_projects = omit_on_error("total_projects", provider.total_projects().await);
        stats
    }
}

fn omit_on_error(field: &'static str, result: Result<u64, StatsError>) -> Option<u64> {
    result
        .inspect_err(|e| tracing::warn!(field, error = %e, "Statistic omitted from digest."))
        .ok()
}

/// Renders `stats` as an info-level digest incident.
pub fn digest_incident(stats: &DailyStats, now: DateTime<Utc>) -> IncidentEvent {
    let mut lines: Vec<String> =
        stats.fields().into_iter().map(|(label, value)| format!("{label}: {value}")).collect();
    if stats.incidents_by_category.is_empty() {
        lines.push("Incidents: none".to_string());
    } else {
        lines.push(format!("Incidents: {}", stats.total_incidents()));
        for (category, count) in &stats.incidents_by_category {
            lines.push(format!("  {category}: {count}"));
        }
    }

    IncidentEvent::new(
        Category::Digest,
        Severity::Info,
        SourceIdentity::new("daily", "digest"),
        format!("Daily report {}", now.format("%Y-%m-%d")),
        lines.join("\n"),
    )
    .with_detail("stats", serde_json::to_value(stats).unwrap_or_default())
}
