//! # StudyLock Core Library
//!
//! Core logic for the StudyLock focus timer: a Pomodoro-style work/break
//! cycle that blocks distracting websites and applications while working,
//! with a password-gated temporary override and persistent history.
//!
//! ## Architecture
//!
//! - **Timer**: a tick-driven state machine. The caller passes elapsed
//!   seconds to `tick()`; the machine never reads the clock on its own
//! - **Enforcement**: decides when the blocking capability should be on and
//!   degrades to timer-only mode when it fails
//! - **Overrides**: timed, password-gated suspension of enforcement with
//!   automatic expiry
//! - **Stats**: daily and weekly totals derived from the append-only history
//! - **Storage**: TOML configuration plus JSON state and history documents
//! - **Runtime**: tokio daemon that drives ticks and runs blocking calls and
//!   writes off the tick path
//!
//! ## Key Components
//!
//! - [`SessionController`]: single owner of the session timeline
//! - [`SessionMachine`]: phase state machine
//! - [`BlockingCapability`]: trait implemented by platform adapters
//! - [`Store`]: persistence trait, with [`FileStore`] for the data directory
//! - [`Daemon`]: foreground runtime

pub mod clock;
pub mod enforcement;
pub mod error;
pub mod events;
pub mod overrides;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ElapsedCounter, ManualClock, SystemClock};
pub use enforcement::{BlockCommand, BlockRules, BlockStatus, BlockingCapability, MemoryBlocker};
pub use error::{BlockError, ConfigError, CoreError, OverrideError, StoreError, TransitionError};
pub use events::{Event, NotificationSink};
pub use overrides::{OverrideManager, OverrideWindow};
pub use runtime::{Command, Daemon, DaemonHandle, DaemonOptions};
pub use session::{Effect, SessionController};
pub use stats::{DailyTotal, IntervalKind, SessionRecord, StatisticsAggregator};
pub use storage::{
    data_dir, DailyReset, FileStore, MemoryStore, PersistQueue, PersistRequest, RetryPolicy,
    SessionConfig, Snapshot, Store,
};
pub use timer::{Phase, SessionMachine, SessionState};
