use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::Argon2Params;
use crate::errors::{Result, ZkVaultError};
use crate::vault::SessionSettings;

/// Host configuration, loaded from `zkvault.toml`.
///
/// Every field has a default, so the core works without a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Lock after this many seconds without `track_activity` (default: 15 min).
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Maximum number of decrypted items kept in memory.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Seconds a decrypted item may sit in the cache untouched (default: 5 min).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Items decrypted between yields in `batch_decrypt`.
    #[serde(default = "default_batch_chunk_size")]
    pub batch_chunk_size: usize,

    /// Default length for `generate-password`.
    #[serde(default = "default_password_length")]
    pub password_length: usize,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_session_timeout_secs() -> u64 {
    15 * 60
}

fn default_cache_capacity() -> usize {
    500
}

fn default_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_batch_chunk_size() -> usize {
    10
}

fn default_password_length() -> usize {
    20
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            session_timeout_secs: default_session_timeout_secs(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            batch_chunk_size: default_batch_chunk_size(),
            password_length: default_password_length(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for.
    pub const FILE_NAME: &'static str = "zkvault.toml";

    /// Load settings from `<dir>/zkvault.toml`.
    ///
    /// If the file does not exist, defaults are returned.  If it exists
    /// but cannot be parsed or holds nonsensical values, an error is
    /// returned.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            ZkVaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;
        settings.validate()?;

        debug!(path = %config_path.display(), "loaded config");
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let zero = [
            ("session_timeout_secs", self.session_timeout_secs == 0),
            ("cache_capacity", self.cache_capacity == 0),
            ("cache_ttl_secs", self.cache_ttl_secs == 0),
            ("batch_chunk_size", self.batch_chunk_size == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ZkVaultError::Config(format!("{field} must be greater than zero")));
        }
        Ok(())
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }

    /// Tunables for a `VaultSession`.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            timeout: Duration::from_secs(self.session_timeout_secs),
            cache_capacity: self.cache_capacity,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            batch_chunk_size: self.batch_chunk_size,
            kdf: self.argon2_params(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.argon2_memory_kib, 65_536);
        assert_eq!(s.argon2_iterations, 3);
        assert_eq!(s.argon2_parallelism, 4);
        assert_eq!(s.session_timeout_secs, 900);
        assert_eq!(s.cache_capacity, 500);
        assert_eq!(s.cache_ttl_secs, 300);
        assert_eq!(s.batch_chunk_size, 10);
        assert_eq!(s.password_length, 20);
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
argon2_memory_kib = 131072
argon2_iterations = 5
argon2_parallelism = 8
session_timeout_secs = 60
cache_capacity = 50
cache_ttl_secs = 30
batch_chunk_size = 25
password_length = 32
"#;
        fs::write(tmp.path().join("zkvault.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.argon2_memory_kib, 131_072);
        assert_eq!(settings.argon2_iterations, 5);
        assert_eq!(settings.argon2_parallelism, 8);
        assert_eq!(settings.session_timeout_secs, 60);
        assert_eq!(settings.cache_capacity, 50);
        assert_eq!(settings.cache_ttl_secs, 30);
        assert_eq!(settings.batch_chunk_size, 25);
        assert_eq!(settings.password_length, 32);
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("zkvault.toml"), "cache_capacity = 42\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.cache_capacity, 42);
        // Rest should be defaults
        assert_eq!(settings.session_timeout_secs, 900);
        assert_eq!(settings.argon2_iterations, 3);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("zkvault.toml"), "not valid {{toml").unwrap();

        let result = Settings::load(tmp.path());
        assert!(matches!(result, Err(ZkVaultError::Config(_))));
    }

    #[test]
    fn load_rejects_zero_capacity() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("zkvault.toml"), "cache_capacity = 0\n").unwrap();

        let err = Settings::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("cache_capacity"));
    }

    #[test]
    fn session_settings_convert_units() {
        let s = Settings {
            session_timeout_secs: 120,
            cache_ttl_secs: 45,
            ..Settings::default()
        };
        let session = s.session_settings();
        assert_eq!(session.timeout, Duration::from_secs(120));
        assert_eq!(session.cache_ttl, Duration::from_secs(45));
        assert_eq!(session.kdf, s.argon2_params());
    }
}
