//! Website blocking through the hosts file.
//!
//! Blocked domains live in one marker-delimited section. Enabling rewrites
//! that section; disabling removes exactly that section and nothing else.
//! A copy of the original file is kept next to it before the first edit.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use studylock_core::BlockError;
use tracing::{debug, info};

pub const BLOCK_START: &str = "# STUDY_LOCK_BLOCK_START";
pub const BLOCK_END: &str = "# STUDY_LOCK_BLOCK_END";
const BACKUP_SUFFIX: &str = "study_lock_backup";

/// Edits are serialized through `edit` so a late enable can never
/// interleave with a disable.
#[derive(Debug)]
pub struct HostsFile {
    path: PathBuf,
    redirect_ip: String,
    edit: Mutex<()>,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>, redirect_ip: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            redirect_ip: redirect_ip.into(),
            edit: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    pub fn enable(&self, websites: &BTreeSet<String>) -> Result<(), BlockError> {
        let _guard = self.lock();
        let content = self.read()?;
        self.ensure_backup(&content)?;
        let updated = with_block(&content, &render_block(websites, &self.redirect_ip));
        if updated != content {
            self.write(&updated)?;
            info!(path = %self.path.display(), domains = websites.len(), "hosts block applied");
        }
        Ok(())
    }

    pub fn disable(&self) -> Result<(), BlockError> {
        let _guard = self.lock();
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let updated = without_block(&content);
        if updated != content {
            self.write(&updated)?;
            info!(path = %self.path.display(), "hosts block removed");
        }
        Ok(())
    }

    pub fn is_blocking(&self) -> bool {
        std::fs::read_to_string(&self.path)
            .map(|content| content.lines().any(|l| l.trim() == BLOCK_START))
            .unwrap_or(false)
    }

    /// Copy the backup over the hosts file. Returns false if no backup
    /// exists.
    pub fn restore_backup(&self) -> Result<bool, BlockError> {
        let _guard = self.lock();
        let backup = self.backup_path();
        if !backup.exists() {
            return Ok(false);
        }
        std::fs::copy(&backup, &self.path)?;
        info!(path = %self.path.display(), "hosts file restored from backup");
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (); a panicked writer leaves nothing to repair.
        self.edit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> Result<String, BlockError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_backup(&self, original: &str) -> Result<(), BlockError> {
        let backup = self.backup_path();
        if backup.exists() {
            return Ok(());
        }
        std::fs::write(&backup, without_block(original))?;
        debug!(backup = %backup.display(), "hosts backup created");
        Ok(())
    }

    /// Rewrite in place. The hosts file is often a special file (or
    /// bind-mounted), so it is truncated and rewritten rather than renamed.
    fn write(&self, content: &str) -> Result<(), BlockError> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

/// Render the marker-delimited section. Every domain is paired with its
/// `www.` variant.
pub fn render_block(websites: &BTreeSet<String>, redirect_ip: &str) -> String {
    let mut domains = BTreeSet::new();
    for site in websites {
        let site = site.trim().to_ascii_lowercase();
        if site.is_empty() {
            continue;
        }
        let bare = site.strip_prefix("www.").unwrap_or(&site).to_string();
        domains.insert(format!("www.{bare}"));
        domains.insert(bare);
    }

    let mut out = String::new();
    out.push_str(BLOCK_START);
    out.push('\n');
    for domain in &domains {
        out.push_str(&format!("{redirect_ip} {domain}\n"));
    }
    out.push_str(BLOCK_END);
    out.push('\n');
    out
}

/// Remove every marker-delimited section. An unterminated section runs to
/// the end of the file.
pub fn without_block(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut inside = false;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed == BLOCK_START {
            inside = true;
            continue;
        }
        if inside {
            if trimmed == BLOCK_END {
                inside = false;
            }
            continue;
        }
        out.push_str(line);
    }
    out
}

/// Replace any existing section with `block`, appended at the end.
pub fn with_block(content: &str, block: &str) -> String {
    let mut out = without_block(content);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(block);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "127.0.0.1 localhost\n::1 localhost\n";

    fn sites(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn block_pairs_www_variants() {
        let block = render_block(&sites(&["reddit.com", "www.x.com"]), "127.0.0.1");
        assert_eq!(
            block,
            "# STUDY_LOCK_BLOCK_START\n\
             127.0.0.1 reddit.com\n\
             127.0.0.1 www.reddit.com\n\
             127.0.0.1 www.x.com\n\
             127.0.0.1 x.com\n\
             # STUDY_LOCK_BLOCK_END\n"
        );
    }

    #[test]
    fn with_block_is_idempotent() {
        let block = render_block(&sites(&["reddit.com"]), "0.0.0.0");
        let once = with_block(ORIGINAL, &block);
        let twice = with_block(&once, &block);
        assert_eq!(once, twice);
        assert_eq!(without_block(&twice), ORIGINAL);
    }

    #[test]
    fn without_block_keeps_user_lines_around_section() {
        let content = format!(
            "127.0.0.1 localhost\n{BLOCK_START}\n127.0.0.1 x.com\n{BLOCK_END}\n10.0.0.2 nas.local\n"
        );
        assert_eq!(
            without_block(&content),
            "127.0.0.1 localhost\n10.0.0.2 nas.local\n"
        );
    }

    #[test]
    fn missing_trailing_newline_is_handled() {
        let block = render_block(&sites(&["x.com"]), "127.0.0.1");
        let updated = with_block("127.0.0.1 localhost", &block);
        assert!(updated.starts_with("127.0.0.1 localhost\n# STUDY_LOCK_BLOCK_START\n"));
    }

    #[test]
    fn enable_disable_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, ORIGINAL).unwrap();
        let hosts = HostsFile::new(&path, "127.0.0.1");

        hosts.enable(&sites(&["reddit.com"])).unwrap();
        assert!(hosts.is_blocking());
        assert!(hosts.backup_path().exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("127.0.0.1 www.reddit.com"));

        hosts.disable().unwrap();
        assert!(!hosts.is_blocking());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);
    }

    #[test]
    fn backup_is_taken_once_and_restorable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, ORIGINAL).unwrap();
        let hosts = HostsFile::new(&path, "127.0.0.1");

        hosts.enable(&sites(&["x.com"])).unwrap();
        std::fs::write(&path, "garbage\n").unwrap();
        hosts.enable(&sites(&["x.com"])).unwrap();
        assert_eq!(std::fs::read_to_string(hosts.backup_path()).unwrap(), ORIGINAL);

        assert!(hosts.restore_backup().unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);
    }

    #[test]
    fn restore_without_backup_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = HostsFile::new(dir.path().join("hosts"), "127.0.0.1");
        assert!(!hosts.restore_backup().unwrap());
    }

    #[test]
    fn concurrent_enable_and_disable_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, ORIGINAL).unwrap();
        let hosts = HostsFile::new(&path, "127.0.0.1");
        let blocked = sites(&["reddit.com", "x.com"]);

        std::thread::scope(|scope| {
            for i in 0..8 {
                let hosts = &hosts;
                let blocked = &blocked;
                scope.spawn(move || {
                    for _ in 0..20 {
                        if i % 2 == 0 {
                            hosts.enable(blocked).unwrap();
                        } else {
                            hosts.disable().unwrap();
                        }
                    }
                });
            }
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(ORIGINAL));
        assert!(content.matches(BLOCK_START).count() <= 1);
        hosts.disable().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);
    }
}
