//! Session state machine.
//!
//! The machine is tick-driven and has no internal thread. The caller passes
//! elapsed whole seconds to `tick()` from whatever scheduler it runs
//! (daemon interval, CLI catch-up, test harness).
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Working -> (ShortBreak | LongBreak) -> Working -> ...
//!            \____________ Paused ____________/
//! any non-Idle --stop--> Idle
//! ```
//!
//! Each completed work interval bumps `completed_cycles_today`; every
//! `cycles_before_long_break`-th break is a long break.

use chrono::{DateTime, Duration, Local};
use tracing::{debug, info};

use super::state::{PausedPhase, Phase, SessionState};
use crate::error::TransitionError;
use crate::events::Event;
use crate::stats::{IntervalKind, SessionRecord};
use crate::storage::{DailyReset, SessionConfig};

#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
}

impl SessionMachine {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            state: SessionState::new(now),
        }
    }

    /// Resume from a persisted snapshot.
    pub fn from_state(mut state: SessionState) -> Self {
        if state.normalize() {
            debug!("normalized persisted session state");
        }
        Self { state }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.state.effective_remaining_seconds()
    }

    pub fn minutes_worked_today(&self) -> u32 {
        self.state.minutes_worked_today
    }

    pub fn mark_saved(&mut self, at: DateTime<Local>) {
        self.state.saved_at = Some(at);
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(
        &mut self,
        config: &SessionConfig,
        now: DateTime<Local>,
    ) -> Result<Vec<Event>, TransitionError> {
        if self.state.phase != Phase::Idle {
            return Err(self.reject("start"));
        }
        Ok(vec![self.begin_phase(Phase::Working, config, now)])
    }

    /// Advance the running phase by `elapsed_secs`.
    ///
    /// At most one phase transition happens per call; elapsed time beyond
    /// the end of the phase is not carried into the next one. Ticking a
    /// paused or idle machine is a no-op.
    pub fn tick(
        &mut self,
        elapsed_secs: u64,
        config: &SessionConfig,
        now: DateTime<Local>,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        if !self.state.phase.is_running() || elapsed_secs == 0 {
            return events;
        }

        let step = elapsed_secs.min(self.state.remaining_seconds);
        self.state.remaining_seconds -= step;

        if self.state.phase == Phase::Working {
            self.accrue_work(step);
            if let Some(event) = self.check_goal(config, now) {
                events.push(event);
            }
        }

        if self.state.remaining_seconds == 0 {
            events.extend(self.complete_phase(config, now));
        }
        events
    }

    pub fn pause(&mut self, now: DateTime<Local>) -> Result<Event, TransitionError> {
        let phase = self.state.phase;
        if !phase.is_running() {
            return Err(self.reject("pause"));
        }
        self.state.paused = Some(PausedPhase {
            phase,
            remaining_seconds: self.state.remaining_seconds,
        });
        self.state.phase = Phase::Paused;
        info!(%phase, remaining = self.state.remaining_seconds, "session paused");
        Ok(Event::Paused {
            phase,
            remaining_secs: self.state.remaining_seconds,
            at: now,
        })
    }

    pub fn resume(&mut self, now: DateTime<Local>) -> Result<Event, TransitionError> {
        let paused = match (self.state.phase, self.state.paused) {
            (Phase::Paused, Some(paused)) => paused,
            _ => return Err(self.reject("resume")),
        };
        self.state.phase = paused.phase;
        self.state.remaining_seconds = paused.remaining_seconds;
        self.state.paused = None;
        self.state.phase_started_at = Some(now);
        info!(phase = %paused.phase, remaining = paused.remaining_seconds, "session resumed");
        Ok(Event::Resumed {
            phase: paused.phase,
            remaining_secs: paused.remaining_seconds,
            at: now,
        })
    }

    /// Abandon the current interval. Nothing is written to history and the
    /// interval's worked time is taken back out of today's total.
    pub fn stop(&mut self, now: DateTime<Local>) -> Result<Event, TransitionError> {
        if self.state.phase == Phase::Idle {
            return Err(self.reject("stop"));
        }
        let phase = self.state.underlying_phase();
        let discarded = self
            .state
            .phase_duration_seconds
            .saturating_sub(self.state.effective_remaining_seconds());

        if phase == Phase::Working {
            self.rollback_work(self.state.phase_worked_seconds);
        }

        self.state.phase = Phase::Idle;
        self.state.paused = None;
        self.state.phase_started_at = None;
        self.state.phase_duration_seconds = 0;
        self.state.remaining_seconds = 0;
        self.state.phase_worked_seconds = 0;
        info!(%phase, discarded_secs = discarded, "session stopped");
        Ok(Event::Stopped {
            phase,
            discarded_secs: discarded,
            at: now,
        })
    }

    /// End the current break early and start working. The break is
    /// recorded with the time actually spent in it.
    pub fn skip_break(
        &mut self,
        config: &SessionConfig,
        now: DateTime<Local>,
    ) -> Result<Vec<Event>, TransitionError> {
        let phase = self.state.phase;
        if !phase.is_break() {
            return Err(self.reject("skip break"));
        }
        let elapsed = self
            .state
            .phase_duration_seconds
            .saturating_sub(self.state.remaining_seconds);
        let record = self.break_record(phase, elapsed, now);
        info!(%phase, elapsed_secs = elapsed, "break skipped");

        Ok(vec![
            Event::BreakSkipped {
                phase,
                elapsed_secs: elapsed,
                record,
                at: now,
            },
            self.begin_phase(Phase::Working, config, now),
        ])
    }

    /// Reset the daily counters if the day window has closed.
    pub fn roll_day(&mut self, policy: DailyReset, now: DateTime<Local>) -> Option<Event> {
        let expired = match policy {
            DailyReset::LocalMidnight => now.date_naive() != self.state.day,
            DailyReset::Rolling24h => now - self.state.day_started_at >= Duration::hours(24),
        };
        if !expired {
            return None;
        }

        let opened_at = self.next_day_start(policy, now).unwrap_or(now);
        let previous = self.state.day;
        self.state.day = now.date_naive();
        self.state.day_started_at = opened_at;
        self.state.completed_cycles_today = 0;
        self.state.minutes_worked_today = 0;
        self.state.worked_carry_seconds = 0;
        // Work before the boundary stays credited to the previous day.
        self.state.phase_worked_seconds = 0;
        self.state.goal_reached_notified = false;
        info!(%previous, day = %self.state.day, "daily counters reset");
        Some(Event::DayRolledOver {
            previous,
            day: self.state.day,
            at: now,
        })
    }

    /// Start of the day window that contains `now`, if a new window has
    /// opened since the current one. `None` while `now` is still today.
    pub fn next_day_start(
        &self,
        policy: DailyReset,
        now: DateTime<Local>,
    ) -> Option<DateTime<Local>> {
        match policy {
            DailyReset::LocalMidnight => {
                if now.date_naive() == self.state.day {
                    return None;
                }
                now.date_naive()
                    .and_hms_opt(0, 0, 0)?
                    .and_local_timezone(Local)
                    .earliest()
            }
            DailyReset::Rolling24h => {
                let days = (now - self.state.day_started_at).num_days();
                if days < 1 {
                    return None;
                }
                Some(self.state.day_started_at + Duration::days(days))
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn reject(&self, action: &'static str) -> TransitionError {
        TransitionError {
            action,
            phase: self.state.phase,
        }
    }

    fn begin_phase(&mut self, phase: Phase, config: &SessionConfig, now: DateTime<Local>) -> Event {
        let minutes = match phase {
            Phase::Working => config.work_minutes,
            Phase::ShortBreak => config.short_break_minutes,
            Phase::LongBreak => config.long_break_minutes,
            _ => 0,
        };
        let duration = u64::from(minutes).saturating_mul(60);
        self.state.phase = phase;
        self.state.paused = None;
        self.state.phase_started_at = Some(now);
        self.state.phase_duration_seconds = duration;
        self.state.remaining_seconds = duration;
        self.state.phase_worked_seconds = 0;
        info!(%phase, duration_secs = duration, "phase started");
        Event::PhaseStarted {
            phase,
            duration_secs: duration,
            at: now,
        }
    }

    fn complete_phase(&mut self, config: &SessionConfig, now: DateTime<Local>) -> Vec<Event> {
        let phase = self.state.phase;
        let duration = self.state.phase_duration_seconds;

        let (record, next) = if phase == Phase::Working {
            self.state.completed_cycles_today += 1;
            let minutes = u32::try_from(duration / 60).unwrap_or(u32::MAX);
            let record = SessionRecord {
                date: now.date_naive(),
                kind: IntervalKind::Work,
                minutes,
                seconds: duration,
                completed_at: now,
            };
            let cadence = config.cycles_before_long_break.max(1);
            let next = if self.state.completed_cycles_today % cadence == 0 {
                Phase::LongBreak
            } else {
                Phase::ShortBreak
            };
            (Some(record), next)
        } else {
            (self.break_record(phase, duration, now), Phase::Working)
        };

        info!(%phase, cycles = self.state.completed_cycles_today, %next, "phase completed");
        vec![
            Event::PhaseCompleted {
                phase,
                record,
                at: now,
            },
            self.begin_phase(next, config, now),
        ]
    }

    /// Fold `seconds` of break into whole minutes. Leftover seconds carry
    /// into the next break record; nothing is written below one minute.
    fn break_record(
        &mut self,
        phase: Phase,
        seconds: u64,
        now: DateTime<Local>,
    ) -> Option<SessionRecord> {
        let kind = match phase {
            Phase::LongBreak => IntervalKind::LongBreak,
            _ => IntervalKind::ShortBreak,
        };
        let total = self.state.break_carry_seconds + seconds;
        let minutes = total / 60;
        self.state.break_carry_seconds = total % 60;
        if minutes == 0 {
            return None;
        }
        Some(SessionRecord {
            date: now.date_naive(),
            kind,
            minutes: u32::try_from(minutes).unwrap_or(u32::MAX),
            seconds,
            completed_at: now,
        })
    }

    fn accrue_work(&mut self, secs: u64) {
        self.state.phase_worked_seconds += secs;
        let total = self.state.worked_carry_seconds + secs;
        let minutes = u32::try_from(total / 60).unwrap_or(u32::MAX);
        self.state.minutes_worked_today = self.state.minutes_worked_today.saturating_add(minutes);
        self.state.worked_carry_seconds = total % 60;
    }

    fn rollback_work(&mut self, secs: u64) {
        let total = (u64::from(self.state.minutes_worked_today) * 60
            + self.state.worked_carry_seconds)
            .saturating_sub(secs);
        self.state.minutes_worked_today = u32::try_from(total / 60).unwrap_or(u32::MAX);
        self.state.worked_carry_seconds = total % 60;
    }

    fn check_goal(&mut self, config: &SessionConfig, now: DateTime<Local>) -> Option<Event> {
        if self.state.goal_reached_notified
            || self.state.minutes_worked_today < config.daily_goal_minutes
        {
            return None;
        }
        self.state.goal_reached_notified = true;
        info!(
            minutes = self.state.minutes_worked_today,
            goal = config.daily_goal_minutes,
            "daily goal reached"
        );
        Some(Event::DailyGoalReached {
            minutes_worked: self.state.minutes_worked_today,
            goal_minutes: config.daily_goal_minutes,
            at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn config() -> SessionConfig {
        SessionConfig {
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            cycles_before_long_break: 4,
            daily_goal_minutes: 100,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn start_pause_resume() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        assert_eq!(m.phase(), Phase::Idle);

        m.start(&cfg, t0()).unwrap();
        assert_eq!(m.phase(), Phase::Working);
        assert_eq!(m.remaining_seconds(), 25 * 60);

        m.tick(30, &cfg, t0());
        m.pause(t0()).unwrap();
        assert_eq!(m.phase(), Phase::Paused);
        assert_eq!(m.remaining_seconds(), 25 * 60 - 30);

        m.resume(t0()).unwrap();
        assert_eq!(m.phase(), Phase::Working);
        assert_eq!(m.remaining_seconds(), 25 * 60 - 30);
    }

    #[test]
    fn start_twice_is_invalid() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        let err = m.start(&cfg, t0()).unwrap_err();
        assert_eq!(err.phase, Phase::Working);
        assert_eq!(err.action, "start");
    }

    #[test]
    fn commands_rejected_in_wrong_phase() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        assert!(m.pause(t0()).is_err());
        assert!(m.resume(t0()).is_err());
        assert!(m.stop(t0()).is_err());
        assert!(m.skip_break(&cfg, t0()).is_err());
        m.start(&cfg, t0()).unwrap();
        assert!(m.resume(t0()).is_err());
        assert!(m.skip_break(&cfg, t0()).is_err());
    }

    #[test]
    fn paused_machine_does_not_tick() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        m.pause(t0()).unwrap();
        assert!(m.tick(600, &cfg, t0()).is_empty());
        assert_eq!(m.remaining_seconds(), 25 * 60);
    }

    #[test]
    fn work_completion_records_and_enters_short_break() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        let events = m.tick(25 * 60, &cfg, t0());
        let record = events.iter().find_map(Event::record).unwrap();
        assert_eq!(record.kind, IntervalKind::Work);
        assert_eq!(record.minutes, 25);
        assert_eq!(m.phase(), Phase::ShortBreak);
        assert_eq!(m.state().completed_cycles_today, 1);
        assert_eq!(m.minutes_worked_today(), 25);
    }

    #[test]
    fn overshoot_does_not_double_fire() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        let events = m.tick(10_000, &cfg, t0());
        let completions = events
            .iter()
            .filter(|e| matches!(e, Event::PhaseCompleted { .. }))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(m.phase(), Phase::ShortBreak);
        assert_eq!(m.remaining_seconds(), 5 * 60);
        assert_eq!(m.state().completed_cycles_today, 1);
    }

    #[test]
    fn zero_tick_is_noop() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        assert!(m.tick(0, &cfg, t0()).is_empty());
        assert_eq!(m.remaining_seconds(), 25 * 60);
    }

    #[test]
    fn long_break_after_configured_cycles() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        let mut breaks = Vec::new();
        for _ in 0..8 {
            m.tick(25 * 60, &cfg, t0());
            breaks.push(m.phase());
            let remaining = m.remaining_seconds();
            m.tick(remaining, &cfg, t0());
        }
        use Phase::*;
        assert_eq!(
            breaks,
            vec![ShortBreak, ShortBreak, ShortBreak, LongBreak, ShortBreak, ShortBreak, ShortBreak, LongBreak]
        );
    }

    #[test]
    fn stop_discards_in_progress_work() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        m.tick(25 * 60, &cfg, t0());
        m.skip_break(&cfg, t0()).unwrap();
        m.tick(10 * 60 + 30, &cfg, t0());
        assert_eq!(m.minutes_worked_today(), 35);

        let event = m.stop(t0()).unwrap();
        assert!(matches!(event, Event::Stopped { phase: Phase::Working, discarded_secs: 630, .. }));
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.minutes_worked_today(), 25);
        assert_eq!(m.state().worked_carry_seconds, 0);
    }

    #[test]
    fn stop_while_paused_from_work_discards_too() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        m.tick(120, &cfg, t0());
        m.pause(t0()).unwrap();
        m.stop(t0()).unwrap();
        assert_eq!(m.minutes_worked_today(), 0);
        assert!(m.state().paused.is_none());
    }

    #[test]
    fn skip_break_records_elapsed_minutes() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        m.tick(25 * 60, &cfg, t0());
        m.tick(120, &cfg, t0());
        let events = m.skip_break(&cfg, t0()).unwrap();
        let record = events.iter().find_map(Event::record).unwrap();
        assert_eq!(record.kind, IntervalKind::ShortBreak);
        assert_eq!(record.minutes, 2);
        assert_eq!(m.phase(), Phase::Working);
    }

    #[test]
    fn short_skips_carry_seconds_forward() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        m.tick(25 * 60, &cfg, t0());
        m.tick(40, &cfg, t0());
        let events = m.skip_break(&cfg, t0()).unwrap();
        assert!(events.iter().find_map(Event::record).is_none());
        assert_eq!(m.state().break_carry_seconds, 40);

        m.tick(25 * 60, &cfg, t0());
        m.tick(50, &cfg, t0());
        let events = m.skip_break(&cfg, t0()).unwrap();
        let record = events.iter().find_map(Event::record).unwrap();
        assert_eq!(record.minutes, 1);
        assert_eq!(m.state().break_carry_seconds, 30);
    }

    #[test]
    fn goal_event_fires_once_mid_phase() {
        let cfg = SessionConfig {
            daily_goal_minutes: 10,
            ..config()
        };
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        let events = m.tick(9 * 60 + 59, &cfg, t0());
        assert!(events.is_empty());
        let events = m.tick(1, &cfg, t0());
        assert!(matches!(events[0], Event::DailyGoalReached { minutes_worked: 10, .. }));
        assert!(m.tick(60, &cfg, t0()).is_empty());
        assert_eq!(m.phase(), Phase::Working);
    }

    #[test]
    fn midnight_rollover_resets_counters() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        m.tick(25 * 60, &cfg, t0());
        assert!(m.roll_day(DailyReset::LocalMidnight, t0() + Duration::hours(3)).is_none());

        let next_day = Local.with_ymd_and_hms(2026, 3, 3, 0, 0, 5).unwrap();
        let event = m.roll_day(DailyReset::LocalMidnight, next_day).unwrap();
        assert!(matches!(event, Event::DayRolledOver { .. }));
        assert_eq!(m.minutes_worked_today(), 0);
        assert_eq!(m.state().completed_cycles_today, 0);
        // The running phase itself is untouched.
        assert_eq!(m.phase(), Phase::ShortBreak);
    }

    #[test]
    fn rolling_reset_waits_a_full_day() {
        let cfg = config();
        let mut m = SessionMachine::new(t0());
        m.start(&cfg, t0()).unwrap();
        m.tick(60, &cfg, t0());
        let next_morning = Local.with_ymd_and_hms(2026, 3, 3, 8, 0, 0).unwrap();
        assert!(m.roll_day(DailyReset::Rolling24h, next_morning).is_none());
        assert_eq!(m.minutes_worked_today(), 1);
        let later = Local.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        assert!(m.roll_day(DailyReset::Rolling24h, later).is_some());
        assert_eq!(m.minutes_worked_today(), 0);
    }

    #[test]
    fn next_day_start_finds_the_latest_boundary() {
        let m = SessionMachine::new(Local.with_ymd_and_hms(2026, 3, 2, 23, 50, 0).unwrap());
        let same_day = Local.with_ymd_and_hms(2026, 3, 2, 23, 59, 0).unwrap();
        assert_eq!(m.next_day_start(DailyReset::LocalMidnight, same_day), None);

        let two_days_on = Local.with_ymd_and_hms(2026, 3, 4, 0, 10, 0).unwrap();
        assert_eq!(
            m.next_day_start(DailyReset::LocalMidnight, two_days_on),
            Some(Local.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(
            m.next_day_start(DailyReset::Rolling24h, two_days_on),
            Some(Local.with_ymd_and_hms(2026, 3, 3, 23, 50, 0).unwrap())
        );
    }

    #[test]
    fn rolling_window_stays_aligned_after_reset() {
        let mut m = SessionMachine::new(t0());
        let late = t0() + Duration::hours(30);
        assert!(m.roll_day(DailyReset::Rolling24h, late).is_some());
        assert_eq!(m.state().day_started_at, t0() + Duration::hours(24));
    }
}
