use chrono::{DateTime, Local};
use clap::Subcommand;
use serde_json::json;
use studylock_core::SessionController;

use super::common::{print_json, CmdResult, Context};
use crate::notify::mm_ss;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a work phase from idle
    Start,
    /// Pause the running phase
    Pause,
    /// Resume a paused phase
    Resume,
    /// Stop the session and return to idle
    Stop,
    /// End the current break early
    SkipBreak,
    /// Print current timer state as JSON
    Status,
}

pub fn run(action: TimerAction, dry_run: bool) -> CmdResult {
    let now = Local::now();
    let mut ctx = Context::open(dry_run, now)?;
    if !matches!(action, TimerAction::Status) {
        ctx.ensure_exclusive()?;
    }
    match action {
        TimerAction::Start => ctx.ensure_daemon_blocks("timer start")?,
        TimerAction::Resume => ctx.ensure_daemon_blocks("timer resume")?,
        TimerAction::SkipBreak => ctx.ensure_daemon_blocks("timer skip-break")?,
        _ => {}
    }

    match action {
        TimerAction::Start => ctx.controller.start(now)?,
        TimerAction::Pause => ctx.controller.pause(now)?,
        TimerAction::Resume => ctx.controller.resume(now)?,
        TimerAction::Stop => ctx.controller.stop(now)?,
        TimerAction::SkipBreak => ctx.controller.skip_break(now)?,
        TimerAction::Status => {}
    }

    ctx.finish(now)?;
    print_status(&ctx.controller, now)
}

/// Status snapshot plus the human-facing fields shown by the timer window.
pub fn status_json(controller: &SessionController, now: DateTime<Local>) -> serde_json::Value {
    let mut value = serde_json::to_value(controller.status(now)).unwrap_or_else(|_| json!({}));
    let state = controller.state();
    let goal = controller.config().daily_goal_minutes;
    let override_minutes_left = controller.override_expires_at().map(|expires| {
        let secs = (expires - now).num_seconds().max(0);
        (secs + 59) / 60
    });
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "remaining".into(),
            json!(mm_ss(state.effective_remaining_seconds())),
        );
        obj.insert(
            "goal_progress".into(),
            json!(format!("{}/{} min", state.minutes_worked_today, goal)),
        );
        obj.insert("goal_reached".into(), json!(state.minutes_worked_today >= goal));
        obj.insert("override_minutes_left".into(), json!(override_minutes_left));
    }
    value
}

fn print_status(controller: &SessionController, now: DateTime<Local>) -> CmdResult {
    print_json(&status_json(controller, now))
}
