//! Enforcement: the blocking capability seam and the coordinator that
//! drives it.

mod capability;
mod coordinator;

pub use capability::{BlockCommand, BlockRules, BlockStatus, BlockingCapability, MemoryBlocker};
pub use coordinator::{EnforcementCoordinator, EnforcementInputs, Trigger};
