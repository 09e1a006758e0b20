use chrono::{Local, NaiveDate};
use clap::Subcommand;
use serde_json::json;

use super::common::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's totals
    Today,
    /// Totals for one day
    Day {
        /// Date as YYYY-MM-DD
        date: NaiveDate,
    },
    /// Seven days ending on `--end` (default today), oldest first
    Week {
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

pub fn run(action: StatsAction, dry_run: bool) -> CmdResult {
    let now = Local::now();
    // Read-only: reconciled records count, nothing is written back.
    let ctx = Context::open(dry_run, now)?;
    let controller = &ctx.controller;

    match action {
        StatsAction::Today => {
            let today = controller.today();
            let totals = controller.daily_totals(today);
            let goal = controller.config().daily_goal_minutes;
            print_json(&json!({
                "totals": totals,
                "daily_goal_minutes": goal,
                "goal_reached": controller.state().minutes_worked_today >= goal,
                "completed_cycles_today": controller.state().completed_cycles_today,
            }))
        }
        StatsAction::Day { date } => print_json(&controller.daily_totals(date)),
        StatsAction::Week { end } => {
            let end = end.unwrap_or_else(|| controller.today());
            let series = controller.weekly_series(end);
            let work: u32 = series.iter().map(|d| d.work_minutes).sum();
            let breaks: u32 = series.iter().map(|d| d.break_minutes).sum();
            print_json(&json!({
                "days": series,
                "work_minutes": work,
                "break_minutes": breaks,
            }))
        }
    }
}
