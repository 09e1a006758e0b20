//! Platform blocking adapters.

pub mod hosts;
pub mod process;

use studylock_core::{BlockError, BlockRules, BlockStatus, BlockingCapability, SessionConfig};
use tracing::warn;

use hosts::HostsFile;
use process::ProcessKiller;

/// Hosts-file website blocking plus process termination.
#[derive(Debug)]
pub struct PlatformBlocker {
    hosts: HostsFile,
    processes: ProcessKiller,
}

impl PlatformBlocker {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            hosts: HostsFile::new(&config.blocking.hosts_path, &config.blocking.redirect_ip),
            processes: ProcessKiller::new(),
        }
    }
}

impl BlockingCapability for PlatformBlocker {
    fn enable(&self, rules: &BlockRules) -> Result<(), BlockError> {
        // Try both; a hosts failure must not leave apps unblocked.
        let sites = self.hosts.enable(&rules.websites);
        let apps = self.processes.enable(&rules.processes);
        sites.and(apps)
    }

    fn disable(&self) -> Result<(), BlockError> {
        self.processes.disable();
        self.hosts.disable()
    }

    fn status(&self) -> BlockStatus {
        BlockStatus {
            active: self.hosts.is_blocking() || self.processes.is_active(),
        }
    }

    fn sweep(&self) -> Result<(), BlockError> {
        if let Err(err) = self.processes.sweep() {
            warn!(error = %err, "process sweep failed");
            return Err(err);
        }
        Ok(())
    }
}

/// Wrapper for one-shot commands: lifts blocking but never applies it,
/// since no process stays behind to lift it again at phase end.
pub struct ReleaseOnly(pub Box<dyn BlockingCapability>);

impl BlockingCapability for ReleaseOnly {
    fn enable(&self, _rules: &BlockRules) -> Result<(), BlockError> {
        Err(BlockError::Unavailable(
            "blocking is only applied by `studylock run`".into(),
        ))
    }

    fn disable(&self) -> Result<(), BlockError> {
        self.0.disable()
    }

    fn status(&self) -> BlockStatus {
        self.0.status()
    }
}
