use thiserror::Error;

/// All errors that can occur in the vault core.
#[derive(Debug, Error)]
pub enum ZkVaultError {
    // --- Crypto errors ---
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// AEAD tag mismatch: the ciphertext was tampered with, corrupted, or
    /// bound to different associated data.
    #[error("Decryption failed — data was tampered with or does not belong here")]
    Authentication,

    #[error("Key unwrap failed: {0}")]
    Unwrap(String),

    // --- Session errors ---
    /// Deliberately carries no detail so callers cannot tell which check failed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session expired — unlock the vault again")]
    SessionExpired,

    #[error("Vault is locked — no key material is available")]
    NotInitialized,

    // --- Vault errors ---
    #[error("Item '{0}' not found")]
    ItemNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    // --- Collaborator errors ---
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl ZkVaultError {
    /// Errors that sit on the authorization boundary and must always be
    /// surfaced to the UI rather than recovered locally.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired | Self::InvalidCredentials | Self::NotInitialized
        )
    }

    /// A single ciphertext failed its integrity check; the session is fine.
    pub fn is_integrity_warning(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}

/// Convenience type alias for vault core results.
pub type Result<T> = std::result::Result<T, ZkVaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_level_classification() {
        assert!(ZkVaultError::SessionExpired.is_session_level());
        assert!(ZkVaultError::InvalidCredentials.is_session_level());
        assert!(ZkVaultError::NotInitialized.is_session_level());
        assert!(!ZkVaultError::Authentication.is_session_level());
        assert!(!ZkVaultError::Unwrap("x".into()).is_session_level());
    }

    #[test]
    fn authentication_is_an_integrity_warning() {
        assert!(ZkVaultError::Authentication.is_integrity_warning());
        assert!(!ZkVaultError::SessionExpired.is_integrity_warning());
    }

    #[test]
    fn invalid_credentials_message_reveals_nothing() {
        assert_eq!(ZkVaultError::InvalidCredentials.to_string(), "Invalid credentials");
    }
}
