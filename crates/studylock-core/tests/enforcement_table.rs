//! Blocking must be on iff Working, under the daily goal, and no override
//! is open. Checked after every step of every command sequence up to a
//! fixed depth, with the capability executing each command it receives.

use chrono::{DateTime, Duration, Local, TimeZone};
use studylock_core::{
    overrides::{hash_password, LEGACY_SALT},
    BlockingCapability, Event, MemoryBlocker, MemoryStore, Phase, PersistQueue, RetryPolicy,
    SessionConfig, SessionController,
};

#[derive(Debug, Clone, Copy)]
enum Step {
    Start,
    Pause,
    Resume,
    Stop,
    SkipBreak,
    Override,
    Tick30,
    Tick60,
}

const STEPS: [Step; 8] = [
    Step::Start,
    Step::Pause,
    Step::Resume,
    Step::Stop,
    Step::SkipBreak,
    Step::Override,
    Step::Tick30,
    Step::Tick60,
];

const DEPTH: u32 = 5;

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

fn tiny_config() -> SessionConfig {
    SessionConfig {
        work_minutes: 2,
        short_break_minutes: 1,
        long_break_minutes: 1,
        cycles_before_long_break: 2,
        daily_goal_minutes: 3,
        override_password_hash: hash_password("pw", LEGACY_SALT),
        override_duration_minutes: 1,
        ..SessionConfig::default()
    }
}

fn replay(sequence: &[Step]) {
    let blocker = MemoryBlocker::new();
    let store = MemoryStore::new();
    let mut queue = PersistQueue::new();
    let mut sink: Vec<Event> = Vec::new();
    let policy = RetryPolicy::default();
    let mut now = t0();
    let mut controller = SessionController::new(tiny_config(), now);
    controller.run_effects_inline(&blocker, &store, &mut queue, policy, &mut sink, now);

    for (i, step) in sequence.iter().enumerate() {
        // Rejections are part of the table; only the predicate matters.
        match step {
            Step::Start => {
                let _ = controller.start(now);
            }
            Step::Pause => {
                let _ = controller.pause(now);
            }
            Step::Resume => {
                let _ = controller.resume(now);
            }
            Step::Stop => {
                let _ = controller.stop(now);
            }
            Step::SkipBreak => {
                let _ = controller.skip_break(now);
            }
            Step::Override => {
                let _ = controller.request_override("pw", now);
            }
            Step::Tick30 | Step::Tick60 => {
                let secs = if matches!(step, Step::Tick30) { 30 } else { 60 };
                now += Duration::seconds(secs);
                controller.tick(secs as u64, now);
            }
        }
        controller.run_effects_inline(&blocker, &store, &mut queue, policy, &mut sink, now);

        let state = controller.state();
        let override_active = controller.override_expires_at().is_some();
        let expected = state.phase == Phase::Working
            && state.minutes_worked_today < controller.config().daily_goal_minutes
            && !override_active;
        assert_eq!(
            blocker.status().active,
            expected,
            "after {:?} (step {i}): phase={} minutes={} override={override_active}",
            &sequence[..=i],
            state.phase,
            state.minutes_worked_today,
        );
        assert_eq!(controller.should_block(), expected);
        assert!(state.remaining_seconds <= state.phase_duration_seconds);
        assert_eq!(state.phase == Phase::Paused, state.paused.is_some());
    }
}

#[test]
fn blocking_predicate_holds_for_all_sequences() {
    let mut sequence = Vec::with_capacity(DEPTH as usize);
    let total = STEPS.len().pow(DEPTH);
    for mut index in 0..total {
        sequence.clear();
        for _ in 0..DEPTH {
            sequence.push(STEPS[index % STEPS.len()]);
            index /= STEPS.len();
        }
        replay(&sequence);
    }
}

#[test]
fn long_sequence_through_goal_and_override() {
    use Step::*;
    replay(&[
        Start, Tick60, Override, Tick30, Tick30, Tick30, Tick60, Tick60, Pause, Resume,
        Tick60, SkipBreak, Tick60, Tick60, Tick60, Stop, Start, Tick60,
    ]);
}
