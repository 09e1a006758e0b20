//! Single-daemon guard.
//!
//! `studylock run` writes its pid to `daemon.lock` in the data directory.
//! One-shot commands that change the session refuse to run while that pid
//! is alive, since the daemon owns the session documents.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

const LOCK_FILE: &str = "daemon.lock";

#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
}

impl DaemonLock {
    /// Claim the data directory for this process.
    ///
    /// # Errors
    /// Fails if another live daemon holds the lock or the file cannot be
    /// written.
    pub fn acquire(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let path = dir.join(LOCK_FILE);
        match holder(&path) {
            Holder::Free => {}
            Holder::Live(Some(pid)) => {
                return Err(format!("daemon already running (pid {pid})").into());
            }
            Holder::Live(None) => return Err("another daemon is starting".into()),
            Holder::Stale => clear_stale(&path)?,
        }
        // Of two racing daemons exactly one creates the file.
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err("another daemon is starting".into());
            }
            Err(e) => return Err(e.into()),
        };
        let lock = Self { path };
        file.write_all(std::process::id().to_string().as_bytes())?;
        file.sync_all()?;
        debug!(path = %lock.path.display(), "daemon lock acquired");
        Ok(lock)
    }
}

enum Holder {
    Free,
    /// Pid is `None` while the owner is still writing it.
    Live(Option<u32>),
    Stale,
}

fn holder(path: &Path) -> Holder {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Holder::Free,
        Err(_) => return Holder::Stale,
    };
    let content = content.trim();
    if content.is_empty() {
        return Holder::Live(None);
    }
    match content.parse::<u32>() {
        Ok(pid) if pid == std::process::id() || is_alive(pid) => Holder::Live(Some(pid)),
        _ => Holder::Stale,
    }
}

fn clear_stale(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale daemon lock");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(error = %err, "could not remove daemon lock");
        }
    }
}

/// Pid of a live daemon owning `dir`, if any. Stale lock files are ignored.
pub fn running_daemon(dir: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(dir.join(LOCK_FILE)).ok()?;
    let pid: u32 = content.trim().parse().ok()?;
    if pid == std::process::id() {
        return None;
    }
    is_alive(pid).then_some(pid)
}

fn is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    system.process(pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_lock_file_means_no_daemon() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(running_daemon(dir.path()), None);
    }

    #[test]
    fn garbage_lock_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "not a pid").unwrap();
        assert_eq!(running_daemon(dir.path()), None);
    }

    #[test]
    fn lock_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = DaemonLock::acquire(dir.path()).unwrap();
            assert!(dir.path().join(LOCK_FILE).exists());
            // Own pid never counts as a competing daemon.
            assert_eq!(running_daemon(dir.path()), None);
        }
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn second_claim_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = DaemonLock::acquire(dir.path()).unwrap();
        assert!(DaemonLock::acquire(dir.path()).is_err());
        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn half_written_lock_counts_as_held() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "").unwrap();
        assert!(DaemonLock::acquire(dir.path()).is_err());
    }

    #[test]
    fn stale_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE), "not a pid").unwrap();
        let _lock = DaemonLock::acquire(dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap();
        assert_eq!(content, std::process::id().to_string());
    }

    #[test]
    fn only_one_of_racing_claims_wins() {
        let dir = tempfile::tempdir().unwrap();
        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| DaemonLock::acquire(dir.path()).ok()))
                .collect();
            let locks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            locks.iter().map(Option::is_some).collect()
        });
        assert_eq!(results.iter().filter(|won| **won).count(), 1);
        assert!(!dir.path().join(LOCK_FILE).exists());
    }
}
