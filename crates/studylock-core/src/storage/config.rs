//! TOML-based session configuration.
//!
//! Stores:
//! - Work/break durations and long break cadence
//! - Daily goal and its reset policy
//! - Override credential and window length
//! - Blocked websites and processes, plus adapter settings
//!
//! Configuration is stored at `<data dir>/config.toml`. Every field has a
//! serde default so partial or older files keep loading.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enforcement::BlockRules;
use crate::error::ConfigError;

/// When the "today" counters start over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyReset {
    /// Reset at local midnight.
    LocalMidnight,
    /// Reset 24 hours after the current day window opened.
    #[serde(rename = "rolling_24h")]
    Rolling24h,
}

/// Settings consumed by the platform blocking adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingConfig {
    #[serde(default = "default_hosts_path")]
    pub hosts_path: String,
    #[serde(default = "default_redirect_ip")]
    pub redirect_ip: String,
    /// How often blocked processes are swept while blocking is active.
    #[serde(default = "default_process_sweep_secs")]
    pub process_sweep_secs: u64,
    /// Upper bound for a single enable/disable call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Settings for the foreground daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Session configuration.
///
/// Durations of a running phase are frozen into `SessionState` when the
/// phase starts, so edits only take effect from the next phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u32,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,
    #[serde(default = "default_cycles_before_long_break")]
    pub cycles_before_long_break: u32,
    #[serde(default = "default_daily_goal_minutes")]
    pub daily_goal_minutes: u32,
    #[serde(default = "default_daily_reset")]
    pub daily_reset: DailyReset,
    /// `sha256(lowercase(password) + salt)` as hex, optionally prefixed with
    /// `salt$`. Empty means no override is possible.
    #[serde(default)]
    pub override_password_hash: String,
    #[serde(default = "default_override_duration_minutes")]
    pub override_duration_minutes: u32,
    #[serde(default = "default_blocked_websites")]
    pub blocked_websites: BTreeSet<String>,
    #[serde(default = "default_blocked_processes")]
    pub blocked_processes: BTreeSet<String>,
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

// Default functions
fn default_work_minutes() -> u32 {
    50
}
fn default_short_break_minutes() -> u32 {
    10
}
fn default_long_break_minutes() -> u32 {
    30
}
fn default_cycles_before_long_break() -> u32 {
    3
}
fn default_daily_goal_minutes() -> u32 {
    300
}
fn default_daily_reset() -> DailyReset {
    DailyReset::LocalMidnight
}
fn default_override_duration_minutes() -> u32 {
    15
}
fn default_blocked_websites() -> BTreeSet<String> {
    ["x.com", "twitter.com", "mangafire.to", "reddit.com"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_blocked_processes() -> BTreeSet<String> {
    ["vlc.exe", "mpv.exe", "steam.exe"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_hosts_path() -> String {
    if cfg!(windows) {
        r"C:\Windows\System32\drivers\etc\hosts".into()
    } else {
        "/etc/hosts".into()
    }
}
fn default_redirect_ip() -> String {
    "127.0.0.1".into()
}
fn default_process_sweep_secs() -> u64 {
    2
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            hosts_path: default_hosts_path(),
            redirect_ip: default_redirect_ip(),
            process_sweep_secs: default_process_sweep_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_minutes: default_work_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            cycles_before_long_break: default_cycles_before_long_break(),
            daily_goal_minutes: default_daily_goal_minutes(),
            daily_reset: default_daily_reset(),
            override_password_hash: String::new(),
            override_duration_minutes: default_override_duration_minutes(),
            blocked_websites: default_blocked_websites(),
            blocked_processes: default_blocked_processes(),
            blocking: BlockingConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl SessionConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => serde_json::Value::Number(
                    value
                        .parse::<u64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                        .into(),
                ),
                // Sets accept either a JSON array or a comma separated list.
                serde_json::Value::Array(_) => {
                    if value.trim_start().starts_with('[') {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    } else {
                        serde_json::Value::Array(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(|s| serde_json::Value::String(s.to_string()))
                                .collect(),
                        )
                    }
                }
                serde_json::Value::Object(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Parse from TOML text.
    ///
    /// # Errors
    /// Returns `ParseFailed` if the text is not a valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Serialize to pretty TOML.
    ///
    /// # Errors
    /// Returns `ParseFailed` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key.
    ///
    /// The updated configuration is validated before it replaces `self`.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the result fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: SessionConfig = serde_json::from_value(json).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject configurations the state machine cannot run.
    ///
    /// # Errors
    /// Returns `InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("work_minutes", self.work_minutes),
            ("short_break_minutes", self.short_break_minutes),
            ("long_break_minutes", self.long_break_minutes),
            ("cycles_before_long_break", self.cycles_before_long_break),
            ("override_duration_minutes", self.override_duration_minutes),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".into(),
                });
            }
        }
        if self.daemon.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "daemon.tick_interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Websites and processes to block while enforcement is active.
    pub fn block_rules(&self) -> BlockRules {
        BlockRules {
            websites: self.blocked_websites.clone(),
            processes: self.blocked_processes.clone(),
        }
    }
}
