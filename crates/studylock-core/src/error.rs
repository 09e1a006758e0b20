//! Core error types for studylock-core.
//!
//! Every failure the core can report is listed here. Only `TransitionError`
//! and `OverrideError` are returned to callers as rejections; blocking and
//! persistence failures are reported but never stop the timer.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::Phase;

/// Core error type for studylock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// State machine misuse (start while working, resume while idle, ...)
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Override request rejected
    #[error(transparent)]
    Override(#[from] OverrideError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A command was issued in a phase that does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid transition: cannot {action} while {phase}")]
pub struct TransitionError {
    pub action: &'static str,
    pub phase: Phase,
}

/// Override request failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverrideError {
    /// Supplied password does not match the stored hash
    #[error("Unauthorized: incorrect override password")]
    Unauthorized,

    /// An override window is already running
    #[error("Override already active until {expires_at}")]
    AlreadyActive {
        expires_at: chrono::DateTime<chrono::Local>,
    },

    /// No password hash has been configured
    #[error("No override password configured")]
    NotConfigured,
}

/// Blocking capability failures.
///
/// These degrade enforcement to timer-only mode; they are never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// Insufficient privilege to edit the hosts file or kill processes
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Underlying IO failure
    #[error("IO failure: {0}")]
    Io(String),

    /// The call did not complete within the configured bound
    #[error("Blocking call timed out after {0}s")]
    Timeout(u64),

    /// The capability cannot be used from here
    #[error("Blocking capability unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for BlockError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => BlockError::PermissionDenied(err.to_string()),
            _ => BlockError::Io(err.to_string()),
        }
    }
}

/// Persistence store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A write did not reach durable storage after retrying
    #[error("Persistence write of {document} failed after {attempts} attempt(s): {message}")]
    PersistenceWriteFailed {
        document: &'static str,
        attempts: u32,
        message: String,
    },

    /// A document could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A document could not be written
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
