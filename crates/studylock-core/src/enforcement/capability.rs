//! The blocking capability seam.
//!
//! Hosts-file editing and process termination live outside the core. The
//! core only sees this trait, which platform adapters implement.

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::BlockError;

/// What to block while enforcement is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRules {
    pub websites: BTreeSet<String>,
    pub processes: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStatus {
    pub active: bool,
}

/// Website/app blocking, implemented per platform.
///
/// Implementations must tolerate repeated calls with identical arguments.
/// Calls may block on the OS; the daemon runs them on a worker, never on
/// the tick path.
pub trait BlockingCapability: Send + Sync {
    fn enable(&self, rules: &BlockRules) -> Result<(), BlockError>;

    fn disable(&self) -> Result<(), BlockError>;

    fn status(&self) -> BlockStatus;

    /// Re-assert blocking while active (e.g. kill processes started since
    /// the last sweep).
    fn sweep(&self) -> Result<(), BlockError> {
        Ok(())
    }
}

/// A request for the capability, produced by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockCommand {
    Enable(BlockRules),
    Disable,
}

impl BlockCommand {
    /// The blocking state this command aims for.
    pub fn target(&self) -> bool {
        matches!(self, BlockCommand::Enable(_))
    }

    pub fn execute(&self, capability: &dyn BlockingCapability) -> Result<(), BlockError> {
        match self {
            BlockCommand::Enable(rules) => capability.enable(rules),
            BlockCommand::Disable => capability.disable(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    active: bool,
    rules: Option<BlockRules>,
    enable_calls: usize,
    disable_calls: usize,
    sweeps: usize,
    fail_next: Option<BlockError>,
}

/// In-memory capability that only records what it was asked to do.
///
/// Used by tests and by `run --dry-run`.
#[derive(Debug, Default)]
pub struct MemoryBlocker {
    inner: Mutex<MemoryInner>,
}

impl MemoryBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next enable/disable call fail with `err`.
    pub fn fail_next(&self, err: BlockError) {
        self.lock().fail_next = Some(err);
    }

    pub fn enable_calls(&self) -> usize {
        self.lock().enable_calls
    }

    pub fn disable_calls(&self) -> usize {
        self.lock().disable_calls
    }

    pub fn sweeps(&self) -> usize {
        self.lock().sweeps
    }

    pub fn rules(&self) -> Option<BlockRules> {
        self.lock().rules.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockingCapability for MemoryBlocker {
    fn enable(&self, rules: &BlockRules) -> Result<(), BlockError> {
        let mut inner = self.lock();
        inner.enable_calls += 1;
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        inner.active = true;
        inner.rules = Some(rules.clone());
        Ok(())
    }

    fn disable(&self) -> Result<(), BlockError> {
        let mut inner = self.lock();
        inner.disable_calls += 1;
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        inner.active = false;
        Ok(())
    }

    fn status(&self) -> BlockStatus {
        BlockStatus {
            active: self.lock().active,
        }
    }

    fn sweep(&self) -> Result<(), BlockError> {
        self.lock().sweeps += 1;
        Ok(())
    }
}
