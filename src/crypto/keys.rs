//! Domain-separated keys derived from the KDF root using HKDF-SHA256.
//!
//! From a single Argon2id root we derive:
//! - the vault **encryption key** (`enc-v1`), which never leaves memory,
//! - the **auth hash** (`auth-v1`), which is safe to send to the server,
//! - the **search key** (`search-v1`), used to blind item domains.
//!
//! HKDF outputs under distinct `info` labels are computationally
//! independent, so learning the auth hash says nothing about the key.

use std::fmt;

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::{Result, ZkVaultError};

use super::kdf::{derive_root_key, KdfParams};

/// Length of derived sub-keys (256 bits).
pub const KEY_LEN: usize = 32;

const ENCRYPTION_LABEL: &[u8] = b"zkvault:enc-v1";
const AUTH_LABEL: &[u8] = b"zkvault:auth-v1";
const SEARCH_LABEL: &[u8] = b"zkvault:search-v1";

/// Number of HMAC bytes kept for a blinded domain hash.
const DOMAIN_HASH_LEN: usize = 16;

/// Run HKDF-SHA256 expand with the given `info`.
///
/// The root already carries full entropy from the KDF, so the extract
/// step runs with HKDF's default zero salt.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, okm.as_mut())
        .map_err(|e| ZkVaultError::KeyDerivation(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// The vault's symmetric AEAD key.  Zeroed when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Create a new `DerivedKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Build a key from an unwrapped byte slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            ZkVaultError::InvalidInput(format!(
                "vault key must be {KEY_LEN} bytes (got {})",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Access the raw key bytes (e.g. to pass to AEAD or key wrapping).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive the key used to blind item domains for server-side search.
    pub fn derive_search_key(&self) -> Result<SearchKey> {
        Ok(SearchKey(hkdf_derive(&self.bytes, SEARCH_LABEL)?))
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Server-side password verifier.  Independent of [`DerivedKey`].
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AuthHash {
    bytes: [u8; KEY_LEN],
}

impl AuthHash {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for AuthHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthHash([REDACTED])")
    }
}

/// Keyed hash for blinding searchable metadata.
pub struct SearchKey(Zeroizing<[u8; KEY_LEN]>);

impl SearchKey {
    /// Blind a normalized domain: `HMAC-SHA256(search_key, domain)`
    /// truncated to 16 bytes and hex-encoded.
    ///
    /// Deterministic per user, so the server can match exact domains
    /// without ever learning them.
    pub fn domain_hash(&self, normalized_domain: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.0.as_ref())
            .map_err(|e| ZkVaultError::KeyDerivation(format!("invalid search key: {e}")))?;
        mac.update(normalized_domain.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(hex::encode(&tag[..DOMAIN_HASH_LEN]))
    }
}

/// Derive the encryption key from the password through the KDF root.
pub fn derive_encryption_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<DerivedKey> {
    let root = derive_root_key(password, salt, params)?;
    encryption_key_from_root(&root)
}

/// Derive the auth hash from the password through the KDF root.
pub fn derive_auth_hash(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<AuthHash> {
    let root = derive_root_key(password, salt, params)?;
    auth_hash_from_root(&root)
}

/// Derive both outputs from a single KDF run.
pub fn derive_session_keys(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<(DerivedKey, AuthHash)> {
    let root = derive_root_key(password, salt, params)?;
    Ok((encryption_key_from_root(&root)?, auth_hash_from_root(&root)?))
}

fn encryption_key_from_root(root: &[u8; KEY_LEN]) -> Result<DerivedKey> {
    let okm = hkdf_derive(root, ENCRYPTION_LABEL)?;
    Ok(DerivedKey::new(*okm))
}

fn auth_hash_from_root(root: &[u8; KEY_LEN]) -> Result<AuthHash> {
    let okm = hkdf_derive(root, AUTH_LABEL)?;
    Ok(AuthHash { bytes: *okm })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::Argon2idV1 {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn auth_hash_differs_from_encryption_key() {
        let salt = [9u8; 16];
        let (key, auth) = derive_session_keys(b"hunter2", &salt, &fast()).unwrap();
        assert_ne!(key.as_bytes(), auth.as_bytes());
    }

    #[test]
    fn single_run_matches_separate_runs() {
        let salt = [4u8; 16];
        let (key, auth) = derive_session_keys(b"pw", &salt, &fast()).unwrap();
        let key2 = derive_encryption_key(b"pw", &salt, &fast()).unwrap();
        let auth2 = derive_auth_hash(b"pw", &salt, &fast()).unwrap();
        assert_eq!(key.as_bytes(), key2.as_bytes());
        assert_eq!(auth, auth2);
    }

    #[test]
    fn domain_hash_is_deterministic_and_truncated() {
        let key = DerivedKey::new([0x42u8; KEY_LEN]);
        let search = key.derive_search_key().unwrap();
        let a = search.domain_hash("example.com").unwrap();
        let b = search.domain_hash("example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DOMAIN_HASH_LEN * 2);
        assert_ne!(a, search.domain_hash("example.org").unwrap());
    }

    #[test]
    fn domain_hash_depends_on_key() {
        let a = DerivedKey::new([1u8; KEY_LEN]).derive_search_key().unwrap();
        let b = DerivedKey::new([2u8; KEY_LEN]).derive_search_key().unwrap();
        assert_ne!(
            a.domain_hash("bank.com").unwrap(),
            b.domain_hash("bank.com").unwrap()
        );
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(DerivedKey::from_slice(&[0u8; 31]).is_err());
        assert!(DerivedKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = DerivedKey::new([0xAA; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "DerivedKey([REDACTED])");
    }
}
