use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::stats::SessionRecord;
use crate::timer::Phase;

/// Every state change in the core produces an Event.
/// Notification sinks, the CLI and the daemon consume them; the core never
/// waits on delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PhaseStarted {
        phase: Phase,
        duration_secs: u64,
        at: DateTime<Local>,
    },
    /// A phase ran to zero. Carries the history record it produced.
    PhaseCompleted {
        phase: Phase,
        record: Option<SessionRecord>,
        at: DateTime<Local>,
    },
    Paused {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Local>,
    },
    Resumed {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Local>,
    },
    /// The session was stopped; progress of the interval was discarded.
    Stopped {
        phase: Phase,
        discarded_secs: u64,
        at: DateTime<Local>,
    },
    BreakSkipped {
        phase: Phase,
        elapsed_secs: u64,
        record: Option<SessionRecord>,
        at: DateTime<Local>,
    },
    DailyGoalReached {
        minutes_worked: u32,
        goal_minutes: u32,
        at: DateTime<Local>,
    },
    DayRolledOver {
        previous: NaiveDate,
        day: NaiveDate,
        at: DateTime<Local>,
    },
    OverrideStarted {
        expires_at: DateTime<Local>,
        at: DateTime<Local>,
    },
    OverrideExpired {
        at: DateTime<Local>,
    },
    /// The blocking capability confirmed a state change.
    BlockingChanged {
        active: bool,
        at: DateTime<Local>,
    },
    /// The blocking capability failed; the timer continues without it.
    EnforcementDegraded {
        wanted_active: bool,
        reason: String,
        at: DateTime<Local>,
    },
    PersistenceWriteFailed {
        document: String,
        message: String,
        at: DateTime<Local>,
    },
    StateSnapshot {
        /// `overridden` while an override window is open.
        phase: Phase,
        underlying_phase: Phase,
        remaining_secs: u64,
        total_secs: u64,
        completed_cycles_today: u32,
        minutes_worked_today: u32,
        daily_goal_minutes: u32,
        override_expires_at: Option<DateTime<Local>>,
        blocking_active: Option<bool>,
        enforcement_degraded: bool,
        /// Last capability error while degraded.
        degraded_reason: Option<String>,
        at: DateTime<Local>,
    },
}

impl Event {
    /// Whether a user-facing notification sink should surface this event.
    pub fn is_notable(&self) -> bool {
        !matches!(self, Event::StateSnapshot { .. } | Event::BlockingChanged { .. })
    }

    /// The history record carried by this event, if any.
    pub fn record(&self) -> Option<&SessionRecord> {
        match self {
            Event::PhaseCompleted { record, .. } | Event::BreakSkipped { record, .. } => {
                record.as_ref()
            }
            _ => None,
        }
    }
}

/// Consumer of core events (toasts, tray, logs).
///
/// `notify` must return promptly; the core never waits on delivery.
pub trait NotificationSink: Send {
    fn notify(&mut self, event: &Event);
}

/// Collects events in order. Handy for tests and for batching output.
impl NotificationSink for Vec<Event> {
    fn notify(&mut self, event: &Event) {
        self.push(event.clone());
    }
}
