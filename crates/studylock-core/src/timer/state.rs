use std::fmt;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Working,
    ShortBreak,
    LongBreak,
    Paused,
    /// Never stored by the state machine. Reported by status snapshots
    /// while an override window is open.
    Overridden,
}

impl Phase {
    /// Phases whose countdown advances on tick.
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Working | Phase::ShortBreak | Phase::LongBreak)
    }

    pub fn is_break(self) -> bool {
        matches!(self, Phase::ShortBreak | Phase::LongBreak)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Working => "working",
            Phase::ShortBreak => "short_break",
            Phase::LongBreak => "long_break",
            Phase::Paused => "paused",
            Phase::Overridden => "overridden",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `resume()` restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedPhase {
    pub phase: Phase,
    pub remaining_seconds: u64,
}

/// The persisted unit for resume-after-restart.
///
/// Invariants: `remaining_seconds <= phase_duration_seconds`, and
/// `phase == Paused` iff `paused.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    #[serde(default)]
    pub phase_started_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub phase_duration_seconds: u64,
    #[serde(default)]
    pub remaining_seconds: u64,
    #[serde(default)]
    pub completed_cycles_today: u32,
    #[serde(default)]
    pub minutes_worked_today: u32,
    /// Worked seconds not yet folded into `minutes_worked_today`.
    #[serde(default)]
    pub worked_carry_seconds: u64,
    /// Seconds worked in the current work interval; discarded by `stop()`.
    #[serde(default)]
    pub phase_worked_seconds: u64,
    /// Break seconds not yet written to history as whole minutes.
    #[serde(default)]
    pub break_carry_seconds: u64,
    #[serde(default)]
    pub paused: Option<PausedPhase>,
    /// Day the "today" counters belong to.
    pub day: NaiveDate,
    /// When the current day window opened (used by the rolling reset).
    pub day_started_at: DateTime<Local>,
    #[serde(default)]
    pub goal_reached_notified: bool,
    #[serde(default)]
    pub saved_at: Option<DateTime<Local>>,
}

impl SessionState {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            phase: Phase::Idle,
            phase_started_at: None,
            phase_duration_seconds: 0,
            remaining_seconds: 0,
            completed_cycles_today: 0,
            minutes_worked_today: 0,
            worked_carry_seconds: 0,
            phase_worked_seconds: 0,
            break_carry_seconds: 0,
            paused: None,
            day: now.date_naive(),
            day_started_at: now,
            goal_reached_notified: false,
            saved_at: None,
        }
    }

    /// The phase a paused session will resume into, or the current phase.
    pub fn underlying_phase(&self) -> Phase {
        match (self.phase, self.paused) {
            (Phase::Paused, Some(p)) => p.phase,
            (phase, _) => phase,
        }
    }

    /// Remaining seconds, frozen at pause time while paused.
    pub fn effective_remaining_seconds(&self) -> u64 {
        match (self.phase, self.paused) {
            (Phase::Paused, Some(p)) => p.remaining_seconds,
            _ => self.remaining_seconds,
        }
    }

    /// Repair a snapshot that violates the invariants (hand edits, older
    /// versions). Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        if self.remaining_seconds > self.phase_duration_seconds {
            self.remaining_seconds = self.phase_duration_seconds;
            changed = true;
        }
        if let Some(p) = self.paused.as_mut() {
            if p.remaining_seconds > self.phase_duration_seconds {
                p.remaining_seconds = self.phase_duration_seconds;
                changed = true;
            }
        }
        let paused_ok = match (self.phase, self.paused) {
            (Phase::Paused, Some(p)) => p.phase.is_running(),
            (Phase::Paused, None) => false,
            (_, Some(_)) => false,
            (_, None) => true,
        };
        if !paused_ok || self.phase == Phase::Overridden {
            *self = Self {
                day: self.day,
                day_started_at: self.day_started_at,
                completed_cycles_today: self.completed_cycles_today,
                minutes_worked_today: self.minutes_worked_today,
                worked_carry_seconds: self.worked_carry_seconds,
                break_carry_seconds: self.break_carry_seconds,
                goal_reached_notified: self.goal_reached_notified,
                saved_at: self.saved_at,
                ..Self::new(self.day_started_at)
            };
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_string(&Phase::ShortBreak).unwrap();
        assert_eq!(json, "\"short_break\"");
    }

    #[test]
    fn normalize_clamps_remaining() {
        let mut state = SessionState::new(t0());
        state.phase = Phase::Working;
        state.phase_duration_seconds = 60;
        state.remaining_seconds = 90;
        assert!(state.normalize());
        assert_eq!(state.remaining_seconds, 60);
        assert_eq!(state.phase, Phase::Working);
    }

    #[test]
    fn normalize_resets_paused_without_snapshot() {
        let mut state = SessionState::new(t0());
        state.phase = Phase::Paused;
        state.minutes_worked_today = 40;
        assert!(state.normalize());
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.minutes_worked_today, 40);
    }

    #[test]
    fn effective_remaining_uses_pause_snapshot() {
        let mut state = SessionState::new(t0());
        state.phase = Phase::Paused;
        state.phase_duration_seconds = 600;
        state.remaining_seconds = 0;
        state.paused = Some(PausedPhase {
            phase: Phase::ShortBreak,
            remaining_seconds: 321,
        });
        assert_eq!(state.underlying_phase(), Phase::ShortBreak);
        assert_eq!(state.effective_remaining_seconds(), 321);
        assert!(!state.normalize());
    }
}
