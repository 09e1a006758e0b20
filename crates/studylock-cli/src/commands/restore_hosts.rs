use chrono::Local;
use serde_json::json;
use tracing::info;

use super::common::{print_json, CmdResult, Context};
use crate::blockers::hosts::HostsFile;

/// Copy the pre-StudyLock hosts backup back over the hosts file.
pub fn run(dry_run: bool) -> CmdResult {
    let ctx = Context::open(dry_run, Local::now())?;
    ctx.ensure_exclusive()?;
    let blocking = &ctx.controller.config().blocking;
    let hosts = HostsFile::new(&blocking.hosts_path, &blocking.redirect_ip);

    if dry_run {
        info!(path = %hosts.path().display(), "dry run, hosts file untouched");
        return print_json(&json!({
            "restored": false,
            "dry_run": true,
            "backup": hosts.backup_path(),
        }));
    }

    let restored = hosts.restore_backup()?;
    if !restored {
        return Err(format!("no backup at {}", hosts.backup_path().display()).into());
    }
    print_json(&json!({
        "restored": true,
        "hosts": hosts.path(),
    }))
}
