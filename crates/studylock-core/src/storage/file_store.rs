//! JSON/TOML documents in the data directory.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{SessionConfig, Snapshot, Store, SNAPSHOT_VERSION};
use crate::error::StoreError;
use crate::stats::SessionRecord;

const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "state.json";
const HISTORY_FILE: &str = "history.json";

/// File-backed store. Every write goes to a temp file in the same directory
/// and is renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at [`super::data_dir`].
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn open_default() -> Result<Self, std::io::Error> {
        Ok(Self::new(super::data_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<(), StoreError> {
        let write_err = |message: String| StoreError::Write {
            path: path.to_path_buf(),
            message,
        };
        std::fs::create_dir_all(&self.dir).map_err(|e| write_err(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| write_err(e.to_string()))?;
        tmp.write_all(content).map_err(|e| write_err(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| write_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;
        debug!(path = %path.display(), bytes = content.len(), "document written");
        Ok(())
    }

    /// Move an unparseable document aside so the next write does not
    /// destroy it.
    fn quarantine(path: &Path, reason: &str) {
        let aside = path.with_extension("corrupt");
        warn!(path = %path.display(), reason, "unreadable document, starting empty");
        if let Err(e) = std::fs::rename(path, &aside) {
            warn!(path = %path.display(), error = %e, "failed to move corrupt document aside");
        }
    }
}

impl Store for FileStore {
    fn load_config(&self) -> Result<Option<SessionConfig>, StoreError> {
        let path = self.config_path();
        let Some(content) = Self::read_optional(&path)? else {
            return Ok(None);
        };
        let config = SessionConfig::from_toml_str(&content).map_err(|e| StoreError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(Some(config))
    }

    fn save_config(&self, config: &SessionConfig) -> Result<(), StoreError> {
        let path = self.config_path();
        let content = config.to_toml_string().map_err(|e| StoreError::Write {
            path: path.clone(),
            message: e.to_string(),
        })?;
        self.write_atomic(&path, content.as_bytes())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        let path = self.state_path();
        let content = match Self::read_optional(&path) {
            Ok(Some(content)) => content,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "state unreadable, starting idle");
                return Ok(None);
            }
        };
        match serde_json::from_str::<Snapshot>(&content) {
            Ok(snapshot) if snapshot.version <= SNAPSHOT_VERSION => Ok(Some(snapshot)),
            Ok(snapshot) => {
                warn!(version = snapshot.version, "state written by a newer version, ignoring");
                Ok(None)
            }
            Err(e) => {
                Self::quarantine(&path, &e.to_string());
                Ok(None)
            }
        }
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = self.state_path();
        let content = serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Write {
            path: path.clone(),
            message: e.to_string(),
        })?;
        self.write_atomic(&path, &content)
    }

    fn load_history(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let path = self.history_path();
        let content = match Self::read_optional(&path) {
            Ok(Some(content)) => content,
            Ok(None) => return Ok(Vec::new()),
            Err(e) => {
                warn!(error = %e, "history unreadable, starting empty");
                return Ok(Vec::new());
            }
        };
        match serde_json::from_str::<Vec<SessionRecord>>(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                Self::quarantine(&path, &e.to_string());
                Ok(Vec::new())
            }
        }
    }

    fn append_records(&self, records: &[SessionRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.history_path();
        let mut history = self.load_history()?;
        let mut seen: HashSet<_> = history.iter().map(SessionRecord::key).collect();
        let before = history.len();
        for record in records {
            if seen.insert(record.key()) {
                history.push(record.clone());
            }
        }
        if history.len() == before {
            return Ok(());
        }
        let content = serde_json::to_vec_pretty(&history).map_err(|e| StoreError::Write {
            path: path.clone(),
            message: e.to_string(),
        })?;
        self.write_atomic(&path, &content)
    }
}
