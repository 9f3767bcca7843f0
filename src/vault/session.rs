//! Session lifecycle types.
//!
//! `Locked -> Authenticating -> Unlocked -> Locked`.  A [`Session`] only
//! exists while the phase is `Unlocked`; destroying it zeroes the key.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::crypto::{Argon2Params, CryptoEngine};

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Locked,
    Authenticating,
    Unlocked,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Locked => "locked",
            Self::Authenticating => "authenticating",
            Self::Unlocked => "unlocked",
        };
        f.write_str(s)
    }
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Logout,
    Timeout,
    AuthenticationFailed,
    KeyUnwrapFailed,
}

/// Published on the session's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Unlocked { user_id: String },
    Locked { reason: LockReason },
    /// The inactivity timer fired.  Sent right after
    /// `Locked { reason: Timeout }`; the UI should show its lock screen.
    Expired,
}

/// Tunables for one [`super::VaultSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub timeout: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub batch_chunk_size: usize,
    pub kdf: Argon2Params,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15 * 60),
            cache_capacity: 500,
            cache_ttl: Duration::from_secs(5 * 60),
            batch_chunk_size: 10,
            kdf: Argon2Params::default(),
        }
    }
}

/// Key material and timers for an unlocked vault.
pub(crate) struct Session {
    pub(crate) engine: CryptoEngine,
    pub(crate) user_id: String,
    pub(crate) started_at: DateTime<Utc>,
    last_activity_at: Instant,
    timeout: Duration,
}

impl Session {
    pub(crate) fn new(engine: CryptoEngine, user_id: String, timeout: Duration) -> Self {
        Self {
            engine,
            user_id,
            started_at: Utc::now(),
            last_activity_at: Instant::now(),
            timeout,
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.last_activity_at + self.timeout
    }

    pub(crate) fn is_idle(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    /// Zero the key.  The session is unusable afterwards.
    pub(crate) fn destroy(&mut self) {
        self.engine.clear_keys();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DerivedKey;

    #[tokio::test(start_paused = true)]
    async fn idle_after_timeout_and_touch_resets() {
        let engine = CryptoEngine::with_key(DerivedKey::new([1u8; 32]));
        let mut session = Session::new(engine, "u1".into(), Duration::from_secs(10));
        assert!(!session.is_idle());

        tokio::time::advance(Duration::from_secs(9)).await;
        session.touch();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!session.is_idle());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(session.is_idle());
    }

    #[tokio::test]
    async fn destroy_clears_the_engine() {
        let engine = CryptoEngine::with_key(DerivedKey::new([1u8; 32]));
        let mut session = Session::new(engine, "u1".into(), Duration::from_secs(10));
        session.destroy();
        assert!(!session.engine.is_initialized());
    }

    #[test]
    fn default_settings_match_documented_values() {
        let s = SessionSettings::default();
        assert_eq!(s.timeout, Duration::from_secs(900));
        assert_eq!(s.cache_capacity, 500);
        assert_eq!(s.cache_ttl, Duration::from_secs(300));
        assert_eq!(s.batch_chunk_size, 10);
    }
}
