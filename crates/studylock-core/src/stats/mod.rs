//! Session history and derived statistics.
//!
//! History is an append-only log of completed intervals. Daily and weekly
//! totals are always derived from it, never stored on their own.

mod aggregator;

pub use aggregator::{DailyTotal, StatisticsAggregator};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl IntervalKind {
    pub fn is_break(self) -> bool {
        !matches!(self, IntervalKind::Work)
    }
}

/// One completed interval. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub date: NaiveDate,
    pub kind: IntervalKind,
    /// Whole minutes credited to this record.
    pub minutes: u32,
    /// Exact length of the interval.
    #[serde(default)]
    pub seconds: u64,
    pub completed_at: DateTime<Local>,
}

impl SessionRecord {
    /// Deduplication key: a record is delivered at most once per instant.
    pub fn key(&self) -> (NaiveDate, DateTime<Local>) {
        (self.date, self.completed_at)
    }
}
