use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::{SessionConfig, Snapshot, Store};
use crate::error::StoreError;
use crate::stats::SessionRecord;

#[derive(Debug, Default)]
struct Inner {
    config: Option<SessionConfig>,
    snapshot: Option<Snapshot>,
    history: Vec<SessionRecord>,
    fail_writes: u32,
    writes: u32,
}

/// In-memory store for tests and dry runs. Writes can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` write calls.
    pub fn fail_writes(&self, n: u32) {
        self.lock().fail_writes = n;
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> u32 {
        self.lock().writes
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.lock().snapshot.clone()
    }

    pub fn history(&self) -> Vec<SessionRecord> {
        self.lock().history.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_write(&self, document: &'static str) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.lock();
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(StoreError::Write {
                path: document.into(),
                message: "injected failure".into(),
            });
        }
        inner.writes += 1;
        Ok(inner)
    }
}

impl Store for MemoryStore {
    fn load_config(&self) -> Result<Option<SessionConfig>, StoreError> {
        Ok(self.lock().config.clone())
    }

    fn save_config(&self, config: &SessionConfig) -> Result<(), StoreError> {
        self.begin_write("config")?.config = Some(config.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.lock().snapshot.clone())
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.begin_write("state")?.snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.lock().history.clone())
    }

    fn append_records(&self, records: &[SessionRecord]) -> Result<(), StoreError> {
        let mut inner = self.begin_write("history")?;
        let mut seen: HashSet<_> = inner.history.iter().map(SessionRecord::key).collect();
        for record in records {
            if seen.insert(record.key()) {
                inner.history.push(record.clone());
            }
        }
        Ok(())
    }
}
