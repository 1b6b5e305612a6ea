//! Counters assembled for the daily digest.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use super::incident::Category;

/// The half-open interval `[start, end)` a digest reports on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsPeriod {
    /// Inclusive start of the period.
    pub start: DateTime<Utc>,
    /// Exclusive end of the period.
    pub end: DateTime<Utc>,
}

impl StatsPeriod {
    /// The 24 hours preceding `end`.
    pub fn last_day(end: DateTime<Utc>) -> Self {
        Self { start: end - Duration::days(1), end }
    }

    /// The 24 whole hours before the hour `end` falls in. Consecutive
    /// daily periods built this way never share an hour.
    pub fn last_day_aligned(end: DateTime<Utc>) -> Self {
        Self::last_day(start_of_hour(end))
    }

    /// The start of every hour that begins inside the period.
    pub fn hours(&self) -> impl Iterator<Item = DateTime<Utc>> {
        let end = self.end;
        let first = start_of_hour(self.start);
        let first = if first < self.start { first + Duration::hours(1) } else { first };
        std::iter::successors(Some(first), |hour| Some(*hour + Duration::hours(1)))
            .take_while(move |hour| *hour < end)
    }
}

/// Truncates `at` to the start of its hour.
pub fn start_of_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::hours(1)).unwrap_or(at)
}

/// A read-only snapshot of collaborator-provided counters. Fields a
/// collaborator failed to provide are `None` and omitted from the digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyStats {
    /// The reporting period.
    pub period: StatsPeriod,
    /// Users created during the period.
    pub new_users: Option<u64>,
    /// Users active during the period.
    pub active_users: Option<u64>,
    /// Users overall.
    pub total_users: Option<u64>,
    /// Projects created during the period.
    pub new_projects: Option<u64>,
    /// Pre-existing projects updated during the period.
    pub updated_projects: Option<u64>,
    /// Projects overall.
    pub total_projects: Option<u64>,
    /// Incidents reported during the period, keyed by category.
    pub incidents_by_category: BTreeMap<Category, u64>,
}

impl DailyStats {
    /// Labelled values in display order, skipping omitted fields.
    pub fn fields(&self) -> Vec<(&'static str, u64)> {
        [
            ("New users", self.new_users),
            ("Active users", self.active_users),
            ("Total users", self.total_users),
            ("New projects", self.new_projects),
            ("Updated projects", self.updated_projects),
            ("Total projects", self.total_projects),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| (label, v)))
        .collect()
    }

    /// Total number of incidents across all categories.
    pub fn total_incidents(&self) -> u64 {
        self.incidents_by_category.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_fields_skip_missing_values() {
        let end = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();
        let stats = DailyStats {
            period: StatsPeriod::last_day(end),
            new_users: Some(4),
            active_users: None,
            total_users: Some(100),
            new_projects: None,
            updated_projects: None,
            total_projects: None,
            incidents_by_category: BTreeMap::from([(Category::Error, 3), (Category::Health, 1)]),
        };

        assert_eq!(stats.fields(), vec![("New users", 4), ("Total users", 100)]);
        assert_eq!(stats.total_incidents(), 4);
        assert_eq!(stats.period.start, Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_aligned_periods_tile_hours() {
        let fire = Utc.with_ymd_and_hms(2025, 3, 2, 9, 15, 30).unwrap();
        let today = StatsPeriod::last_day_aligned(fire);
        let tomorrow = StatsPeriod::last_day_aligned(fire + Duration::days(1));

        assert_eq!(today.start, Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(today.end, Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap());

        let today_hours: Vec<_> = today.hours().collect();
        let tomorrow_hours: Vec<_> = tomorrow.hours().collect();
        assert_eq!(today_hours.len(), 24);
        assert_eq!(tomorrow_hours.len(), 24);
        assert_eq!(today_hours.last().map(|h| *h + Duration::hours(1)), Some(tomorrow_hours[0]));
        assert!(today_hours.iter().all(|h| !tomorrow_hours.contains(h)));
    }

    #[test]
    fn test_hours_of_unaligned_period() {
        let period = StatsPeriod {
            start: Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        };
        let hours: Vec<u32> = period.hours().map(|h| chrono::Timelike::hour(&h)).collect();
        assert_eq!(hours, vec![10, 11]);
    }
}
