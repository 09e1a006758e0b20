//! Daily and weekly totals over session history.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub work_minutes: u32,
    pub break_minutes: u32,
    pub sessions: u32,
}

impl DailyTotal {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            work_minutes: 0,
            break_minutes: 0,
            sessions: 0,
        }
    }
}

/// Read-only derived view over the session history.
///
/// Records are indexed by date so a daily total only touches that day's
/// records.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAggregator {
    by_date: BTreeMap<NaiveDate, Vec<SessionRecord>>,
    seen: HashSet<(NaiveDate, DateTime<Local>)>,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a loaded history, dropping duplicates.
    pub fn from_records(records: impl IntoIterator<Item = SessionRecord>) -> Self {
        let mut agg = Self::new();
        for record in records {
            agg.record_completed_interval(record);
        }
        agg
    }

    /// Append a completed interval. Returns false if a record with the same
    /// `(date, completed_at)` was already present.
    pub fn record_completed_interval(&mut self, record: SessionRecord) -> bool {
        if !self.seen.insert(record.key()) {
            return false;
        }
        self.by_date.entry(record.date).or_default().push(record);
        true
    }

    pub fn daily_totals(&self, date: NaiveDate) -> DailyTotal {
        let mut total = DailyTotal::empty(date);
        for record in self.by_date.get(&date).into_iter().flatten() {
            if record.kind.is_break() {
                total.break_minutes += record.minutes;
            } else {
                total.work_minutes += record.minutes;
            }
            total.sessions += 1;
        }
        total
    }

    /// The 7 days ending at `end_date` inclusive, oldest first.
    pub fn weekly_series(&self, end_date: NaiveDate) -> Vec<DailyTotal> {
        (0..7)
            .rev()
            .map(|offset| self.daily_totals(end_date - Duration::days(offset)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::IntervalKind;
    use chrono::TimeZone;

    fn record(day: u32, hour: u32, kind: IntervalKind, minutes: u32) -> SessionRecord {
        let completed_at = Local.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap();
        SessionRecord {
            date: completed_at.date_naive(),
            kind,
            minutes,
            seconds: u64::from(minutes) * 60,
            completed_at,
        }
    }

    #[test]
    fn daily_totals_split_work_and_break() {
        let agg = StatisticsAggregator::from_records([
            record(2, 9, IntervalKind::Work, 25),
            record(2, 10, IntervalKind::ShortBreak, 5),
            record(2, 11, IntervalKind::LongBreak, 15),
            record(3, 9, IntervalKind::Work, 50),
        ]);
        let day = agg.daily_totals(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(day.work_minutes, 25);
        assert_eq!(day.break_minutes, 20);
        assert_eq!(day.sessions, 3);
    }

    #[test]
    fn duplicate_delivery_is_ignored() {
        let mut agg = StatisticsAggregator::new();
        assert!(agg.record_completed_interval(record(2, 9, IntervalKind::Work, 25)));
        assert!(!agg.record_completed_interval(record(2, 9, IntervalKind::Work, 25)));
        let day = agg.daily_totals(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(day.work_minutes, 25);
        assert_eq!(day.sessions, 1);
    }

    #[test]
    fn weekly_series_is_zero_filled_and_ordered() {
        let agg = StatisticsAggregator::from_records([
            record(2, 9, IntervalKind::Work, 25),
            record(8, 9, IntervalKind::Work, 50),
            // Outside the window
            record(1, 9, IntervalKind::Work, 99),
        ]);
        let end = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let week = agg.weekly_series(end);
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(week[0].work_minutes, 25);
        assert_eq!(week[6].date, end);
        assert_eq!(week[6].work_minutes, 50);
        assert!(week[1..6].iter().all(|d| d.sessions == 0));
    }
}
