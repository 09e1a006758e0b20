//! Session controller.
//!
//! Glues the state machine, override manager, enforcement coordinator and
//! statistics together on one logical timeline. The controller performs no
//! I/O: every side effect (blocking call, document write, notification) is
//! queued as an [`Effect`] and executed by the caller, either inline (CLI
//! one-shot commands) or by the daemon's workers.

use std::collections::VecDeque;

use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::enforcement::{
    BlockCommand, BlockingCapability, EnforcementCoordinator, EnforcementInputs, Trigger,
};
use crate::error::{BlockError, ConfigError, OverrideError, StoreError, TransitionError};
use crate::events::{Event, NotificationSink};
use crate::overrides::OverrideManager;
use crate::stats::{DailyTotal, SessionRecord, StatisticsAggregator};
use crate::storage::{
    PersistQueue, PersistRequest, RetryPolicy, SessionConfig, Snapshot, Store, SNAPSHOT_VERSION,
};
use crate::timer::{Phase, SessionMachine, SessionState};

/// A side effect requested by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Hand to the blocking capability; report back via `blocking_result`.
    Block(BlockCommand),
    /// Hand to the ordered writer.
    Persist(PersistRequest),
    /// Hand to the notification sink.
    Notify(Event),
}

#[derive(Debug)]
pub struct SessionController {
    config: SessionConfig,
    machine: SessionMachine,
    overrides: OverrideManager,
    coordinator: EnforcementCoordinator,
    stats: StatisticsAggregator,
    outbox: VecDeque<Effect>,
}

impl SessionController {
    /// Fresh controller with no persisted state.
    pub fn new(config: SessionConfig, now: DateTime<Local>) -> Self {
        Self::restore(config, None, Vec::new(), now)
    }

    /// Rebuild from persisted documents and reconcile with `now`: roll the
    /// day, catch a running phase up on the time the process was down, and
    /// expire an override whose deadline passed. A paused session stays
    /// frozen until an explicit `resume`.
    pub fn restore(
        config: SessionConfig,
        snapshot: Option<Snapshot>,
        history: Vec<SessionRecord>,
        now: DateTime<Local>,
    ) -> Self {
        let (machine, overrides) = match snapshot {
            Some(snapshot) => (
                SessionMachine::from_state(snapshot.session),
                OverrideManager::from_window(snapshot.override_window),
            ),
            None => (SessionMachine::new(now), OverrideManager::new()),
        };
        let mut controller = Self {
            config,
            machine,
            overrides,
            coordinator: EnforcementCoordinator::new(),
            stats: StatisticsAggregator::from_records(history),
            outbox: VecDeque::new(),
        };
        controller.reconcile(now);
        controller
    }

    fn reconcile(&mut self, now: DateTime<Local>) {
        let state = self.machine.state();
        let since = state
            .phase
            .is_running()
            .then(|| state.saved_at.or(state.phase_started_at))
            .flatten()
            .filter(|since| *since < now);

        let Some(since) = since else {
            let events = self.housekeeping(now);
            self.absorb(events, now);
            self.enforce(Trigger::Transition);
            self.persist_snapshot(now);
            return;
        };

        info!(
            downtime_secs = (now - since).num_seconds(),
            phase = %state.phase,
            "catching up after restart"
        );
        // Time before the day boundary counts toward the day it belongs to,
        // which the rollover then clears.
        let mut events = Vec::new();
        let mut resume_from = since;
        if let Some(boundary) = self
            .machine
            .next_day_start(self.config.daily_reset, now)
            .filter(|boundary| *boundary > since)
        {
            let before = secs_between(since, boundary);
            events.extend(self.machine.tick(before, &self.config, boundary));
            resume_from = boundary;
        }
        let transitioned = events
            .iter()
            .any(|e| matches!(e, Event::PhaseCompleted { .. }));
        events.extend(self.housekeeping(now));
        if !transitioned {
            let after = secs_between(resume_from, now);
            events.extend(self.machine.tick(after, &self.config, now));
        }

        self.absorb(events, now);
        self.enforce(Trigger::Transition);
        self.persist_snapshot(now);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// `Overridden` while an override window is open, else the machine's
    /// phase.
    pub fn display_phase(&self) -> Phase {
        if self.overrides.is_active() {
            Phase::Overridden
        } else {
            self.machine.phase()
        }
    }

    pub fn override_expires_at(&self) -> Option<DateTime<Local>> {
        self.overrides.expires_at()
    }

    pub fn enforcement_inputs(&self) -> EnforcementInputs {
        EnforcementInputs {
            phase: self.machine.phase(),
            minutes_worked_today: self.machine.minutes_worked_today(),
            daily_goal_minutes: self.config.daily_goal_minutes,
            override_active: self.overrides.is_active(),
        }
    }

    /// Whether blocking should be on right now.
    pub fn should_block(&self) -> bool {
        self.enforcement_inputs().should_block()
    }

    pub fn blocking_active(&self) -> Option<bool> {
        self.coordinator.blocking_active()
    }

    pub fn enforcement_degraded(&self) -> bool {
        self.coordinator.is_degraded()
    }

    pub fn daily_totals(&self, date: NaiveDate) -> DailyTotal {
        self.stats.daily_totals(date)
    }

    pub fn weekly_series(&self, end_date: NaiveDate) -> Vec<DailyTotal> {
        self.stats.weekly_series(end_date)
    }

    /// Day the "today" counters belong to.
    pub fn today(&self) -> NaiveDate {
        self.machine.state().day
    }

    pub fn status(&self, now: DateTime<Local>) -> Event {
        let state = self.machine.state();
        Event::StateSnapshot {
            phase: self.display_phase(),
            underlying_phase: state.underlying_phase(),
            remaining_secs: state.effective_remaining_seconds(),
            total_secs: state.phase_duration_seconds,
            completed_cycles_today: state.completed_cycles_today,
            minutes_worked_today: state.minutes_worked_today,
            daily_goal_minutes: self.config.daily_goal_minutes,
            override_expires_at: self.overrides.expires_at(),
            blocking_active: self.coordinator.blocking_active(),
            enforcement_degraded: self.coordinator.is_degraded(),
            degraded_reason: self.coordinator.degraded_reason().map(str::to_string),
            at: now,
        }
    }

    pub fn snapshot(&self, now: DateTime<Local>) -> Snapshot {
        let mut session = self.machine.state().clone();
        session.saved_at = Some(now);
        Snapshot {
            version: SNAPSHOT_VERSION,
            session,
            override_window: self.overrides.window().clone(),
            saved_at: now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self, now: DateTime<Local>) -> Result<(), TransitionError> {
        let mut events = self.housekeeping(now);
        let result = self.machine.start(&self.config, now);
        if let Ok(started) = &result {
            events.extend(started.iter().cloned());
        }
        self.commit(events, now);
        result.map(|_| ())
    }

    /// Pause the running phase. The snapshot is queued for writing
    /// immediately so a crash right after still resumes from here.
    pub fn pause(&mut self, now: DateTime<Local>) -> Result<(), TransitionError> {
        let mut events = self.housekeeping(now);
        let result = self.machine.pause(now);
        if let Ok(event) = &result {
            events.push(event.clone());
        }
        self.commit(events, now);
        result.map(|_| ())
    }

    pub fn resume(&mut self, now: DateTime<Local>) -> Result<(), TransitionError> {
        let mut events = self.housekeeping(now);
        let result = self.machine.resume(now);
        if let Ok(event) = &result {
            events.push(event.clone());
        }
        self.commit(events, now);
        result.map(|_| ())
    }

    pub fn stop(&mut self, now: DateTime<Local>) -> Result<(), TransitionError> {
        let mut events = self.housekeeping(now);
        let result = self.machine.stop(now);
        if let Ok(event) = &result {
            events.push(event.clone());
        }
        self.commit(events, now);
        result.map(|_| ())
    }

    pub fn skip_break(&mut self, now: DateTime<Local>) -> Result<(), TransitionError> {
        let mut events = self.housekeeping(now);
        let result = self.machine.skip_break(&self.config, now);
        if let Ok(skipped) = &result {
            events.extend(skipped.iter().cloned());
        }
        self.commit(events, now);
        result.map(|_| ())
    }

    /// Open an override window. Blocking is disabled right away whatever the
    /// phase.
    pub fn request_override(
        &mut self,
        password: &str,
        now: DateTime<Local>,
    ) -> Result<(), OverrideError> {
        let mut events = self.housekeeping(now);
        let result = self.overrides.request(password, &self.config, now);
        if let Ok(event) = &result {
            events.push(event.clone());
        }
        self.commit(events, now);
        result.map(|_| ())
    }

    /// Advance by `elapsed_secs` of monotonic time observed at `now`.
    ///
    /// Also expires the override window and rolls the day, so it must be
    /// called even while idle or paused.
    pub fn tick(&mut self, elapsed_secs: u64, now: DateTime<Local>) {
        let mut events = self.housekeeping(now);
        events.extend(self.machine.tick(elapsed_secs, &self.config, now));
        if events.is_empty() {
            // Goal crossings always emit an event, so a quiet tick can only
            // confirm the current desired state.
            self.enforce(Trigger::Tick);
            return;
        }
        self.commit(events, now);
    }

    /// Replace the configuration. A running phase keeps its frozen duration;
    /// new values apply from the next phase.
    ///
    /// # Errors
    /// Returns the validation error; nothing changes in that case.
    pub fn update_config(
        &mut self,
        config: SessionConfig,
        now: DateTime<Local>,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        if config.block_rules() != self.config.block_rules() {
            self.coordinator.invalidate();
        }
        self.config = config;
        info!("configuration updated");
        self.outbox
            .push_back(Effect::Persist(PersistRequest::Config(self.config.clone())));
        let events = self.housekeeping(now);
        self.absorb(events, now);
        // Goal or rules may have changed under a steady phase.
        self.enforce(Trigger::Transition);
        self.persist_snapshot(now);
        Ok(())
    }

    /// Pause a running phase ahead of process exit and request a final
    /// snapshot. Blocking is released because the phase is no longer
    /// Working.
    pub fn shutdown(&mut self, now: DateTime<Local>) {
        if self.machine.phase().is_running() {
            if let Err(err) = self.pause(now) {
                debug!(error = %err, "nothing to pause on shutdown");
            }
        } else {
            self.persist_snapshot(now);
        }
    }

    // ── Effect results ───────────────────────────────────────────────

    /// Fold the outcome of a `Block` effect back in.
    pub fn blocking_result(
        &mut self,
        target: bool,
        result: Result<(), BlockError>,
        now: DateTime<Local>,
    ) {
        if let Some(event) = self.coordinator.on_result(target, result, now) {
            self.outbox.push_back(Effect::Notify(event));
        }
    }

    /// Report a write that exhausted its retries. The session continues in
    /// memory; the next successful write reconciles.
    pub fn persistence_failed(&mut self, err: &StoreError, now: DateTime<Local>) {
        let document = match err {
            StoreError::PersistenceWriteFailed { document, .. } => (*document).to_string(),
            _ => "unknown".to_string(),
        };
        self.outbox.push_back(Effect::Notify(Event::PersistenceWriteFailed {
            document,
            message: err.to_string(),
            at: now,
        }));
    }

    pub fn drain_effects(&mut self) -> Vec<Effect> {
        self.outbox.drain(..).collect()
    }

    pub fn has_pending_effects(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Execute every pending effect on the calling thread until none are
    /// left. Used by one-shot CLI commands that have no worker threads.
    pub fn run_effects_inline(
        &mut self,
        capability: &dyn BlockingCapability,
        store: &dyn Store,
        queue: &mut PersistQueue,
        policy: RetryPolicy,
        sink: &mut dyn NotificationSink,
        now: DateTime<Local>,
    ) {
        while let Some(effect) = self.outbox.pop_front() {
            match effect {
                Effect::Block(command) => {
                    let result = command.execute(capability);
                    self.blocking_result(command.target(), result, now);
                }
                Effect::Persist(request) => {
                    if let Err(err) = queue.write_blocking(store, &request, policy) {
                        warn!(error = %err, "persistence failed");
                        self.persistence_failed(&err, now);
                    }
                }
                Effect::Notify(event) => sink.notify(&event),
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Day rollover and override expiry, checked before every command.
    fn housekeeping(&mut self, now: DateTime<Local>) -> Vec<Event> {
        let mut events = Vec::new();
        events.extend(self.machine.roll_day(self.config.daily_reset, now));
        events.extend(self.overrides.tick(now));
        events
    }

    /// Record, notify, re-evaluate enforcement and snapshot after a batch of
    /// transition events. A rejected command with no events changes nothing.
    fn commit(&mut self, events: Vec<Event>, now: DateTime<Local>) {
        if events.is_empty() {
            return;
        }
        self.absorb(events, now);
        self.enforce(Trigger::Transition);
        self.persist_snapshot(now);
    }

    fn absorb(&mut self, events: Vec<Event>, now: DateTime<Local>) {
        for event in events {
            if let Some(record) = event.record() {
                if self.stats.record_completed_interval(record.clone()) {
                    self.outbox
                        .push_back(Effect::Persist(PersistRequest::Record(record.clone())));
                } else {
                    debug!(completed_at = %record.completed_at, "duplicate record ignored");
                }
            }
            self.outbox.push_back(Effect::Notify(event));
        }
        self.machine.mark_saved(now);
    }

    fn enforce(&mut self, trigger: Trigger) {
        let inputs = self.enforcement_inputs();
        if let Some(command) = self
            .coordinator
            .evaluate(inputs, &self.config.block_rules(), trigger)
        {
            self.outbox.push_back(Effect::Block(command));
        }
    }

    fn persist_snapshot(&mut self, now: DateTime<Local>) {
        self.machine.mark_saved(now);
        self.outbox
            .push_back(Effect::Persist(PersistRequest::Snapshot(self.snapshot(now))));
    }
}

fn secs_between(from: DateTime<Local>, to: DateTime<Local>) -> u64 {
    (to - from).num_seconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::{hash_password, LEGACY_SALT};
    use chrono::{Duration, TimeZone};

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

    fn blocks(effects: &[Effect]) -> Vec<bool> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Block(cmd) => Some(cmd.target()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fresh_controller_requests_disable_and_snapshot() {
        let mut c = SessionController::new(config(), t0());
        let effects = c.drain_effects();
        assert_eq!(blocks(&effects), vec![false]);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Persist(PersistRequest::Snapshot(_)))));
    }

    #[test]
    fn start_enables_blocking_and_persists() {
        let mut c = SessionController::new(config(), t0());
        c.drain_effects();
        c.start(t0()).unwrap();
        let effects = c.drain_effects();
        assert_eq!(blocks(&effects), vec![true]);
        assert!(matches!(
            effects.last(),
            Some(Effect::Persist(PersistRequest::Snapshot(_)))
        ));
    }

    #[test]
    fn rejected_command_has_no_effects() {
        let mut c = SessionController::new(config(), t0());
        c.drain_effects();
        assert!(c.resume(t0()).is_err());
        assert!(c.drain_effects().is_empty());
    }

    #[test]
    fn quiet_tick_writes_nothing() {
        let mut c = SessionController::new(config(), t0());
        c.start(t0()).unwrap();
        c.drain_effects();
        c.tick(1, t0() + Duration::seconds(1));
        assert!(c.drain_effects().is_empty());
    }

    #[test]
    fn override_disables_blocking_during_work() {
        let mut cfg = config();
        cfg.override_password_hash = hash_password("pw", LEGACY_SALT);
        let mut c = SessionController::new(cfg, t0());
        c.start(t0()).unwrap();
        c.drain_effects();
        c.request_override("PW", t0()).unwrap();
        assert_eq!(c.display_phase(), Phase::Overridden);
        assert_eq!(blocks(&c.drain_effects()), vec![false]);

        c.tick(15 * 60, t0() + Duration::minutes(15));
        let effects = c.drain_effects();
        assert_eq!(blocks(&effects), vec![true]);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Notify(Event::OverrideExpired { .. }))));
    }

    #[test]
    fn completed_work_is_recorded_once() {
        let mut c = SessionController::new(config(), t0());
        c.start(t0()).unwrap();
        c.drain_effects();
        let end = t0() + Duration::minutes(25);
        c.tick(25 * 60, end);
        let records = c
            .drain_effects()
            .into_iter()
            .filter(|e| matches!(e, Effect::Persist(PersistRequest::Record(_))))
            .count();
        assert_eq!(records, 1);
        assert_eq!(c.daily_totals(end.date_naive()).work_minutes, 25);
        assert_eq!(c.phase(), Phase::ShortBreak);
    }

    #[test]
    fn restore_catches_up_running_phase() {
        let mut c = SessionController::new(config(), t0());
        c.start(t0()).unwrap();
        let snapshot = c.snapshot(t0());

        let later = t0() + Duration::minutes(10);
        let restored = SessionController::restore(config(), Some(snapshot), Vec::new(), later);
        assert_eq!(restored.phase(), Phase::Working);
        assert_eq!(restored.state().remaining_seconds, 15 * 60);
        assert_eq!(restored.state().minutes_worked_today, 10);
    }

    #[test]
    fn restore_keeps_paused_phase_frozen() {
        let mut c = SessionController::new(config(), t0());
        c.start(t0()).unwrap();
        c.tick(60, t0() + Duration::minutes(1));
        c.pause(t0() + Duration::minutes(1)).unwrap();
        let snapshot = c.snapshot(t0() + Duration::minutes(1));

        let later = t0() + Duration::hours(3);
        let mut restored = SessionController::restore(config(), Some(snapshot), Vec::new(), later);
        assert_eq!(restored.phase(), Phase::Paused);
        restored.resume(later).unwrap();
        assert_eq!(restored.phase(), Phase::Working);
        assert_eq!(restored.state().remaining_seconds, 24 * 60);
    }

    #[test]
    fn shutdown_pauses_running_phase() {
        let mut c = SessionController::new(config(), t0());
        c.start(t0()).unwrap();
        c.drain_effects();
        c.shutdown(t0() + Duration::seconds(30));
        assert_eq!(c.phase(), Phase::Paused);
        let effects = c.drain_effects();
        assert_eq!(blocks(&effects), vec![false]);
    }

    #[test]
    fn config_update_applies_from_next_phase() {
        let mut c = SessionController::new(config(), t0());
        c.start(t0()).unwrap();
        let mut cfg = config();
        cfg.work_minutes = 50;
        c.update_config(cfg, t0()).unwrap();
        assert_eq!(c.state().phase_duration_seconds, 25 * 60);
        assert_eq!(c.config().work_minutes, 50);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut c = SessionController::new(config(), t0());
        let mut cfg = config();
        cfg.work_minutes = 0;
        assert!(c.update_config(cfg, t0()).is_err());
        assert_eq!(c.config().work_minutes, 25);
    }

    #[test]
    fn changed_rules_reissue_enable() {
        let mut c = SessionController::new(config(), t0());
        c.start(t0()).unwrap();
        c.drain_effects();
        c.blocking_result(true, Ok(()), t0());
        let mut cfg = config();
        cfg.blocked_websites.insert("news.ycombinator.com".into());
        c.update_config(cfg, t0()).unwrap();
        assert_eq!(blocks(&c.drain_effects()), vec![true]);
    }
}
