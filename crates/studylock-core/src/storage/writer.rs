//! Ordered persistence with retry.
//!
//! Requests are applied strictly in the order they were issued. A history
//! append that keeps failing is held in a backlog and flushed ahead of the
//! next request, so no completed interval is lost while the process lives.

use std::time::Duration;

use tracing::warn;

use super::{SessionConfig, Snapshot, Store};
use crate::error::StoreError;
use crate::stats::SessionRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum PersistRequest {
    Config(SessionConfig),
    Snapshot(Snapshot),
    Record(SessionRecord),
}

impl PersistRequest {
    pub fn document(&self) -> &'static str {
        match self {
            PersistRequest::Config(_) => "config",
            PersistRequest::Snapshot(_) => "state",
            PersistRequest::Record(_) => "history",
        }
    }
}

/// Exponential backoff between attempts of a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempts are 1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Applies persistence requests against a store, one at a time.
#[derive(Debug, Default)]
pub struct PersistQueue {
    backlog: Vec<SessionRecord>,
}

impl PersistQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records still waiting to reach the history document.
    pub fn backlog(&self) -> &[SessionRecord] {
        &self.backlog
    }

    /// One attempt at `request`. Records are queued before the attempt so
    /// a failure keeps them for the next call.
    ///
    /// # Errors
    /// Returns the store error of the requested document.
    pub fn attempt(&mut self, store: &dyn Store, request: &PersistRequest) -> Result<(), StoreError> {
        match request {
            PersistRequest::Record(record) => {
                if !self.backlog.iter().any(|r| r.key() == record.key()) {
                    self.backlog.push(record.clone());
                }
                self.flush_backlog(store)
            }
            PersistRequest::Snapshot(snapshot) => {
                self.flush_backlog_best_effort(store);
                store.save_snapshot(snapshot)
            }
            PersistRequest::Config(config) => {
                self.flush_backlog_best_effort(store);
                store.save_config(config)
            }
        }
    }

    /// Run `request` to completion on the calling thread, sleeping between
    /// attempts.
    ///
    /// # Errors
    /// `PersistenceWriteFailed` once every attempt has failed.
    pub fn write_blocking(
        &mut self,
        store: &dyn Store,
        request: &PersistRequest,
        policy: RetryPolicy,
    ) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.attempt(store, request) {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= policy.attempts => {
                    return Err(StoreError::PersistenceWriteFailed {
                        document: request.document(),
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    let delay = policy.delay_after(attempt);
                    warn!(document = request.document(), attempt, ?delay, error = %err, "write failed, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    fn flush_backlog(&mut self, store: &dyn Store) -> Result<(), StoreError> {
        if self.backlog.is_empty() {
            return Ok(());
        }
        store.append_records(&self.backlog)?;
        self.backlog.clear();
        Ok(())
    }

    fn flush_backlog_best_effort(&mut self, store: &dyn Store) {
        if let Err(err) = self.flush_backlog(store) {
            warn!(pending = self.backlog.len(), error = %err, "history backlog still pending");
        }
    }
}
