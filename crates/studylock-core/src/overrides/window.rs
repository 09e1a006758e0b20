//! Timed override window.
//!
//! While the window is open enforcement is suspended. Expiry is driven by
//! `tick(now)` against the absolute wall-clock deadline, so it fires during
//! breaks and survives restarts without being extended.

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::password::verify_password;
use crate::error::OverrideError;
use crate::events::Event;
use crate::storage::SessionConfig;

/// Invariant: `active` implies both timestamps are set and
/// `expires_at > started_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideWindow {
    pub active: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Local>>,
}

impl OverrideWindow {
    fn is_valid(&self) -> bool {
        match (self.active, self.started_at, self.expires_at) {
            (false, _, _) => true,
            (true, Some(start), Some(end)) => end > start,
            (true, _, _) => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverrideManager {
    window: OverrideWindow,
}

impl OverrideManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted window. A malformed active window is dropped.
    pub fn from_window(window: OverrideWindow) -> Self {
        if window.is_valid() {
            Self { window }
        } else {
            warn!(?window, "discarding malformed override window");
            Self::default()
        }
    }

    pub fn window(&self) -> &OverrideWindow {
        &self.window
    }

    pub fn is_active(&self) -> bool {
        self.window.active
    }

    pub fn expires_at(&self) -> Option<DateTime<Local>> {
        self.window.expires_at.filter(|_| self.window.active)
    }

    /// Whole seconds left in the window, 0 when inactive.
    pub fn remaining_seconds(&self, now: DateTime<Local>) -> u64 {
        self.expires_at()
            .map(|end| (end - now).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Open an override window if `password` matches the stored credential.
    ///
    /// # Errors
    /// `NotConfigured` if no credential is stored, `Unauthorized` on a
    /// mismatch, `AlreadyActive` if a window is already open. None of them
    /// change state.
    pub fn request(
        &mut self,
        password: &str,
        config: &SessionConfig,
        now: DateTime<Local>,
    ) -> Result<Event, OverrideError> {
        if config.override_password_hash.trim().is_empty() {
            return Err(OverrideError::NotConfigured);
        }
        if !verify_password(password, &config.override_password_hash) {
            warn!("override rejected: wrong password");
            return Err(OverrideError::Unauthorized);
        }
        if let Some(expires_at) = self.expires_at() {
            return Err(OverrideError::AlreadyActive { expires_at });
        }

        let minutes = i64::from(config.override_duration_minutes.max(1));
        let expires_at = now + Duration::minutes(minutes);
        self.window = OverrideWindow {
            active: true,
            started_at: Some(now),
            expires_at: Some(expires_at),
        };
        info!(%expires_at, minutes, "override started");
        Ok(Event::OverrideStarted {
            expires_at,
            at: now,
        })
    }

    /// Close the window once its deadline has passed.
    pub fn tick(&mut self, now: DateTime<Local>) -> Option<Event> {
        let expires_at = self.expires_at()?;
        if now < expires_at {
            return None;
        }
        self.window = OverrideWindow::default();
        info!(%expires_at, "override expired");
        Some(Event::OverrideExpired { at: now })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::password::{hash_password, LEGACY_SALT};
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn config() -> SessionConfig {
        SessionConfig {
            override_password_hash: hash_password("open sesame", LEGACY_SALT),
            override_duration_minutes: 15,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn request_opens_window() {
        let mut m = OverrideManager::new();
        let event = m.request("Open Sesame", &config(), t0()).unwrap();
        assert!(matches!(event, Event::OverrideStarted { .. }));
        assert!(m.is_active());
        assert_eq!(m.expires_at(), Some(t0() + Duration::minutes(15)));
        assert_eq!(m.remaining_seconds(t0()), 15 * 60);
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let mut m = OverrideManager::new();
        assert_eq!(
            m.request("nope", &config(), t0()),
            Err(OverrideError::Unauthorized)
        );
        assert!(!m.is_active());
    }

    #[test]
    fn missing_credential_is_not_configured() {
        let mut m = OverrideManager::new();
        let cfg = SessionConfig::default();
        assert_eq!(m.request("x", &cfg, t0()), Err(OverrideError::NotConfigured));
    }

    #[test]
    fn second_request_is_already_active() {
        let mut m = OverrideManager::new();
        m.request("open sesame", &config(), t0()).unwrap();
        let later = t0() + Duration::minutes(5);
        assert!(matches!(
            m.request("open sesame", &config(), later),
            Err(OverrideError::AlreadyActive { .. })
        ));
        // Not extended
        assert_eq!(m.expires_at(), Some(t0() + Duration::minutes(15)));
    }

    #[test]
    fn tick_expires_at_deadline() {
        let mut m = OverrideManager::new();
        m.request("open sesame", &config(), t0()).unwrap();
        assert!(m.tick(t0() + Duration::seconds(899)).is_none());
        assert!(m.is_active());
        let event = m.tick(t0() + Duration::minutes(15));
        assert!(matches!(event, Some(Event::OverrideExpired { .. })));
        assert!(!m.is_active());
        assert!(m.tick(t0() + Duration::minutes(16)).is_none());
    }

    #[test]
    fn malformed_window_is_dropped() {
        let m = OverrideManager::from_window(OverrideWindow {
            active: true,
            started_at: Some(t0()),
            expires_at: Some(t0()),
        });
        assert!(!m.is_active());
    }
}
