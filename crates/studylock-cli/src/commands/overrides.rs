use chrono::Local;

use super::common::{print_json, CmdResult, Context};
use super::timer::status_json;

/// Open a timed override window, lifting blocking until it expires.
pub fn run(password: &str, dry_run: bool) -> CmdResult {
    let now = Local::now();
    let mut ctx = Context::open(dry_run, now)?;
    ctx.ensure_exclusive()?;
    ctx.ensure_daemon_blocks("override")?;
    ctx.controller.request_override(password, now)?;
    ctx.finish(now)?;
    print_json(&status_json(&ctx.controller, now))
}
