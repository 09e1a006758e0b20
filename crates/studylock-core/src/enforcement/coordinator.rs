//! Decides when the blocking capability should be on.
//!
//! Blocking is active iff the phase is Working, today's worked minutes are
//! below the daily goal, and no override window is open. The coordinator
//! turns that predicate into at most one command per change of desired
//! state; results come back asynchronously through `on_result`.

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::capability::{BlockCommand, BlockRules};
use crate::error::BlockError;
use crate::events::Event;
use crate::timer::Phase;

/// Everything the blocking predicate depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementInputs {
    pub phase: Phase,
    pub minutes_worked_today: u32,
    pub daily_goal_minutes: u32,
    pub override_active: bool,
}

impl EnforcementInputs {
    pub fn should_block(&self) -> bool {
        self.phase == Phase::Working
            && self.minutes_worked_today < self.daily_goal_minutes
            && !self.override_active
    }
}

/// Why the predicate is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A phase change, override change, startup or config change.
    Transition,
    /// A plain timer tick.
    Tick,
}

#[derive(Debug, Clone, Default)]
pub struct EnforcementCoordinator {
    /// Last state handed to the capability.
    requested: Option<bool>,
    /// Last state the capability confirmed.
    confirmed: Option<bool>,
    /// Set when the last request failed; cleared by the next success.
    degraded: Option<String>,
}

impl EnforcementCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached "blocking currently active" flag, `None` until confirmed.
    pub fn blocking_active(&self) -> Option<bool> {
        self.confirmed
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    /// Forget what was requested so the next evaluation re-issues a command
    /// (used when the block rules change).
    pub fn invalidate(&mut self) {
        self.requested = None;
    }

    /// Returns a command if the desired state differs from what was last
    /// requested. After a failure the same state is retried only on a
    /// `Transition`, not on every tick.
    pub fn evaluate(
        &mut self,
        inputs: EnforcementInputs,
        rules: &BlockRules,
        trigger: Trigger,
    ) -> Option<BlockCommand> {
        let desired = inputs.should_block();
        let retry = self.degraded.is_some() && trigger == Trigger::Transition;
        if self.requested == Some(desired) && !retry {
            return None;
        }
        self.requested = Some(desired);
        debug!(desired, ?inputs, ?trigger, "enforcement change requested");
        Some(if desired {
            BlockCommand::Enable(rules.clone())
        } else {
            BlockCommand::Disable
        })
    }

    /// Fold a capability result back in. Failures degrade to timer-only
    /// mode and are reported as an event; they never propagate.
    pub fn on_result(
        &mut self,
        target: bool,
        result: Result<(), BlockError>,
        now: DateTime<Local>,
    ) -> Option<Event> {
        match result {
            Ok(()) => {
                self.degraded = None;
                let changed = self.confirmed != Some(target);
                self.confirmed = Some(target);
                if changed {
                    info!(active = target, "blocking state changed");
                    Some(Event::BlockingChanged {
                        active: target,
                        at: now,
                    })
                } else {
                    None
                }
            }
            Err(err) => {
                warn!(wanted_active = target, error = %err, "enforcement degraded");
                let reason = err.to_string();
                self.degraded = Some(reason.clone());
                Some(Event::EnforcementDegraded {
                    wanted_active: target,
                    reason,
                    at: now,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn inputs(phase: Phase, minutes: u32, override_active: bool) -> EnforcementInputs {
        EnforcementInputs {
            phase,
            minutes_worked_today: minutes,
            daily_goal_minutes: 100,
            override_active,
        }
    }

    #[test]
    fn predicate_truth_table() {
        let phases = [
            Phase::Idle,
            Phase::Working,
            Phase::ShortBreak,
            Phase::LongBreak,
            Phase::Paused,
        ];
        for phase in phases {
            for minutes in [0, 99, 100, 150] {
                for override_active in [false, true] {
                    let expected = phase == Phase::Working && minutes < 100 && !override_active;
                    assert_eq!(
                        inputs(phase, minutes, override_active).should_block(),
                        expected,
                        "{phase} {minutes} {override_active}"
                    );
                }
            }
        }
    }

    #[test]
    fn repeated_evaluation_is_idempotent() {
        let mut c = EnforcementCoordinator::new();
        let rules = BlockRules::default();
        let cmd = c.evaluate(inputs(Phase::Working, 0, false), &rules, Trigger::Transition);
        assert_eq!(cmd, Some(BlockCommand::Enable(rules.clone())));
        c.on_result(true, Ok(()), now());
        assert_eq!(c.evaluate(inputs(Phase::Working, 1, false), &rules, Trigger::Tick), None);
        assert_eq!(
            c.evaluate(inputs(Phase::Working, 1, false), &rules, Trigger::Transition),
            None
        );
    }

    #[test]
    fn first_evaluation_always_issues_a_command() {
        let mut c = EnforcementCoordinator::new();
        let cmd = c.evaluate(inputs(Phase::Idle, 0, false), &BlockRules::default(), Trigger::Tick);
        assert_eq!(cmd, Some(BlockCommand::Disable));
    }

    #[test]
    fn failure_is_retried_on_next_transition_only() {
        let mut c = EnforcementCoordinator::new();
        let rules = BlockRules::default();
        let working = inputs(Phase::Working, 0, false);
        c.evaluate(working, &rules, Trigger::Transition).unwrap();
        let event = c.on_result(true, Err(BlockError::PermissionDenied("no".into())), now());
        assert!(matches!(event, Some(Event::EnforcementDegraded { wanted_active: true, .. })));
        assert!(c.is_degraded());
        assert_eq!(c.blocking_active(), None);

        assert_eq!(c.evaluate(working, &rules, Trigger::Tick), None);
        assert!(c.evaluate(working, &rules, Trigger::Transition).is_some());
        let event = c.on_result(true, Ok(()), now());
        assert!(matches!(event, Some(Event::BlockingChanged { active: true, .. })));
        assert!(!c.is_degraded());
    }

    #[test]
    fn goal_crossing_on_tick_disables() {
        let mut c = EnforcementCoordinator::new();
        let rules = BlockRules::default();
        c.evaluate(inputs(Phase::Working, 99, false), &rules, Trigger::Transition);
        c.on_result(true, Ok(()), now());
        let cmd = c.evaluate(inputs(Phase::Working, 100, false), &rules, Trigger::Tick);
        assert_eq!(cmd, Some(BlockCommand::Disable));
    }

    #[test]
    fn invalidate_forces_reapply() {
        let mut c = EnforcementCoordinator::new();
        let rules = BlockRules::default();
        let working = inputs(Phase::Working, 0, false);
        c.evaluate(working, &rules, Trigger::Transition);
        c.on_result(true, Ok(()), now());
        c.invalidate();
        assert!(c.evaluate(working, &rules, Trigger::Transition).is_some());
    }
}
