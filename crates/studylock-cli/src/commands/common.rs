//! Shared setup for one-shot commands.

use chrono::{DateTime, Local};
use studylock_core::{
    BlockingCapability, FileStore, MemoryBlocker, PersistQueue, RetryPolicy, SessionConfig,
    SessionController, Store,
};
use tracing::debug;

use crate::blockers::{PlatformBlocker, ReleaseOnly};
use crate::lock;
use crate::notify::LogSink;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Session documents loaded and reconciled with the current time.
pub struct Context {
    pub store: FileStore,
    pub controller: SessionController,
    daemon_pid: Option<u32>,
    dry_run: bool,
}

impl Context {
    pub fn open(dry_run: bool, now: DateTime<Local>) -> Result<Self, Box<dyn std::error::Error>> {
        let store = FileStore::open_default()?;
        let config = store.load_config()?.unwrap_or_default();
        let snapshot = store.load_snapshot()?;
        let history = store.load_history()?;
        let controller = SessionController::restore(config, snapshot, history, now);
        let daemon_pid = lock::running_daemon(store.dir());
        Ok(Self {
            store,
            controller,
            daemon_pid,
            dry_run,
        })
    }

    /// Refuse to change the session behind a running daemon's back.
    pub fn ensure_exclusive(&self) -> CmdResult {
        match self.daemon_pid {
            Some(pid) => Err(format!(
                "studylock daemon is running (pid {pid}); send commands through its console"
            )
            .into()),
            None => Ok(()),
        }
    }

    /// Refuse commands that would start blocking with nothing left running
    /// to lift it when the phase ends. `--dry-run` never blocks, so it
    /// may drive the timer directly.
    pub fn ensure_daemon_blocks(&self, action: &str) -> CmdResult {
        if self.dry_run {
            return Ok(());
        }
        Err(format!(
            "`{action}` starts blocking that only `studylock run` can lift on time; \
             use the daemon console, or pass --dry-run"
        )
        .into())
    }

    /// Release blocking and write documents for everything the command
    /// changed. One-shot commands never apply blocking. With a daemon
    /// running nothing is written; it owns the files.
    pub fn finish(&mut self, now: DateTime<Local>) -> CmdResult {
        if let Some(pid) = self.daemon_pid {
            debug!(pid, "daemon owns the session, skipping writes");
            self.controller.drain_effects();
            return Ok(());
        }
        let blocker = blocker_for(self.controller.config(), self.dry_run);
        let blocker: Box<dyn BlockingCapability> = if self.dry_run {
            blocker
        } else {
            Box::new(ReleaseOnly(blocker))
        };
        let mut queue = PersistQueue::new();
        let mut sink = LogSink;
        self.controller.run_effects_inline(
            blocker.as_ref(),
            &self.store,
            &mut queue,
            RetryPolicy::default(),
            &mut sink,
            now,
        );
        Ok(())
    }
}

/// Platform adapters, or an in-memory stand-in under `--dry-run`.
pub fn blocker_for(config: &SessionConfig, dry_run: bool) -> Box<dyn BlockingCapability> {
    if dry_run {
        Box::new(MemoryBlocker::new())
    } else {
        Box::new(PlatformBlocker::from_config(config))
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
