mod config;
mod file_store;
mod memory;
mod writer;

pub use config::{BlockingConfig, DaemonConfig, DailyReset, SessionConfig};
pub use file_store::FileStore;
pub use memory::MemoryStore;
pub use writer::{PersistQueue, PersistRequest, RetryPolicy};

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::overrides::OverrideWindow;
use crate::stats::SessionRecord;
use crate::timer::SessionState;

/// Current `state.json` layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Returns the data directory holding `config.toml`, `state.json` and
/// `history.json`.
///
/// `STUDYLOCK_DATA_DIR` wins if set. Otherwise `~/.config/studylock[-dev]/`
/// based on `STUDYLOCK_ENV` (set `STUDYLOCK_ENV=dev` for the development
/// directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("STUDYLOCK_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("STUDYLOCK_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("studylock-dev")
            } else {
                base_dir.join("studylock")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Everything needed to resume after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub session: SessionState,
    #[serde(default, rename = "override")]
    pub override_window: OverrideWindow,
    pub saved_at: DateTime<Local>,
}

/// Durable storage for the three documents.
///
/// A missing document loads as `None` (or an empty history). Writes must be
/// atomic: a failed write leaves the previous document intact.
pub trait Store: Send + Sync {
    fn load_config(&self) -> Result<Option<SessionConfig>, StoreError>;

    fn save_config(&self, config: &SessionConfig) -> Result<(), StoreError>;

    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError>;

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    fn load_history(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Append records to the history. Records already present (same date and
    /// completion time) are skipped so a retried append never duplicates.
    fn append_records(&self, records: &[SessionRecord]) -> Result<(), StoreError>;
}
