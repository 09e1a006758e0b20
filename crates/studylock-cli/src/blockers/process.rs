//! Application blocking by terminating named processes.

use std::collections::BTreeSet;
use std::sync::Mutex;

use studylock_core::BlockError;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{info, warn};

/// Comparable form of a process name: lowercase, without a `.exe` suffix,
/// so `VLC.exe` in the config also matches `vlc` on Linux and macOS.
pub fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower
        .strip_suffix(".exe")
        .map(str::to_string)
        .unwrap_or(lower)
}

pub fn matches(blocked: &BTreeSet<String>, process_name: &str) -> bool {
    !blocked.is_empty() && blocked.contains(&normalize_name(process_name))
}

#[derive(Debug, Default)]
struct Inner {
    names: BTreeSet<String>,
    active: bool,
}

#[derive(Debug, Default)]
pub struct ProcessKiller {
    inner: Mutex<Inner>,
}

impl ProcessKiller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self, processes: &BTreeSet<String>) -> Result<(), BlockError> {
        let names: BTreeSet<String> = processes.iter().map(|p| normalize_name(p)).collect();
        {
            let mut inner = self.lock();
            inner.names = names.clone();
            inner.active = true;
        }
        kill_matching(&names)
    }

    pub fn disable(&self) {
        let mut inner = self.lock();
        inner.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Kill blocked processes started since the last sweep.
    pub fn sweep(&self) -> Result<(), BlockError> {
        let names = {
            let inner = self.lock();
            if !inner.active {
                return Ok(());
            }
            inner.names.clone()
        };
        kill_matching(&names)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn kill_matching(names: &BTreeSet<String>) -> Result<(), BlockError> {
    if names.is_empty() {
        return Ok(());
    }
    let own_pid = std::process::id();
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All);

    let mut killed = 0usize;
    let mut refused = Vec::new();
    for (pid, process) in system.processes() {
        if pid.as_u32() == own_pid {
            continue;
        }
        let name = process.name().to_string_lossy();
        if !matches(names, &name) {
            continue;
        }
        if process.kill() {
            killed += 1;
            info!(pid = pid.as_u32(), name = %name, "terminated blocked process");
        } else {
            warn!(pid = pid.as_u32(), name = %name, "could not terminate blocked process");
            refused.push(name.into_owned());
        }
    }

    if refused.is_empty() || killed > 0 {
        Ok(())
    } else {
        Err(BlockError::PermissionDenied(format!(
            "cannot terminate {}",
            refused.join(", ")
        )))
    }
}
