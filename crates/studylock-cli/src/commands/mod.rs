pub mod common;
pub mod config;
pub mod overrides;
pub mod restore_hosts;
pub mod run;
pub mod stats;
pub mod timer;
