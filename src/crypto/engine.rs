//! Stateful wrapper around the primitives.
//!
//! A `CryptoEngine` owns at most one [`DerivedKey`].  It is not a
//! global: every session (and every one-time export key) gets its own
//! instance.  After [`CryptoEngine::clear_keys`] every keyed operation
//! fails with [`ZkVaultError::NotInitialized`].

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encoding::{base64_decode, base64_encode};
use crate::errors::{Result, ZkVaultError};

use super::encryption::{self, EncryptOptions, EncryptedPayload};
use super::kdf::KdfParams;
use super::keys::{self, AuthHash, DerivedKey, SearchKey};

/// Record of how the engine's key was derived (salt + KDF params).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfRecord {
    pub kdf: KdfParams,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,
}

/// Holds the vault key for the lifetime of one session.
#[derive(Debug)]
pub struct CryptoEngine {
    params: KdfParams,
    key: Option<DerivedKey>,
    record: Option<KdfRecord>,
}

impl CryptoEngine {
    /// A fresh, uninitialized engine that will derive with `params`.
    pub fn new(params: KdfParams) -> Self {
        Self {
            params,
            key: None,
            record: None,
        }
    }

    /// An engine holding a key obtained without a password (device unwrap).
    pub fn with_key(key: DerivedKey) -> Self {
        Self {
            params: KdfParams::default(),
            key: Some(key),
            record: None,
        }
    }

    /// Derive the vault key from `(master_password, salt)`.
    pub fn initialize(&mut self, master_password: &[u8], salt: &[u8]) -> Result<KdfRecord> {
        let key = keys::derive_encryption_key(master_password, salt, &self.params)?;
        Ok(self.install(key, salt))
    }

    /// Derive the vault key and the auth hash from one KDF run.
    pub fn initialize_with_auth_hash(
        &mut self,
        master_password: &[u8],
        salt: &[u8],
    ) -> Result<AuthHash> {
        let (key, auth) = keys::derive_session_keys(master_password, salt, &self.params)?;
        self.install(key, salt);
        Ok(auth)
    }

    /// Derive the server verifier.  Does not require an initialized engine.
    pub fn generate_auth_hash(&self, master_password: &[u8], salt: &[u8]) -> Result<AuthHash> {
        keys::derive_auth_hash(master_password, salt, &self.params)
    }

    fn install(&mut self, key: DerivedKey, salt: &[u8]) -> KdfRecord {
        let record = KdfRecord {
            kdf: self.params,
            salt: salt.to_vec(),
        };
        self.key = Some(key);
        self.record = Some(record.clone());
        record
    }

    pub fn is_initialized(&self) -> bool {
        self.key.is_some()
    }

    /// The current key, or `NotInitialized` once cleared.
    pub fn key(&self) -> Result<&DerivedKey> {
        self.key.as_ref().ok_or(ZkVaultError::NotInitialized)
    }

    /// How the current key was derived, if it came from a password.
    pub fn kdf_record(&self) -> Option<&KdfRecord> {
        self.record.as_ref()
    }

    pub fn search_key(&self) -> Result<SearchKey> {
        self.key()?.derive_search_key()
    }

    pub fn encrypt(&self, plaintext: &[u8], options: EncryptOptions<'_>) -> Result<EncryptedPayload> {
        encryption::encrypt(self.key()?.as_bytes(), plaintext, options)
    }

    pub fn decrypt(
        &self,
        payload: &EncryptedPayload,
        additional_data: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        encryption::decrypt(self.key()?.as_bytes(), payload, additional_data)
    }

    /// Destroy the key material.  Idempotent.
    pub fn clear_keys(&mut self) {
        // Dropping the DerivedKey zeroes its bytes.
        self.key = None;
        self.record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CryptoEngine {
        CryptoEngine::new(KdfParams::Argon2idV1 {
            memory_kib: 8_192,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn uninitialized_engine_refuses_to_encrypt() {
        let e = engine();
        assert!(matches!(
            e.encrypt(b"x", EncryptOptions::default()),
            Err(ZkVaultError::NotInitialized)
        ));
    }

    #[test]
    fn clear_keys_makes_engine_unusable() {
        let mut e = engine();
        e.initialize(b"pw", &[1u8; 16]).unwrap();
        let payload = e.encrypt(b"x", EncryptOptions::default()).unwrap();

        e.clear_keys();
        assert!(!e.is_initialized());
        assert!(e.kdf_record().is_none());
        assert!(matches!(e.decrypt(&payload, None), Err(ZkVaultError::NotInitialized)));

        // Second clear is a no-op.
        e.clear_keys();
    }

    #[test]
    fn initialize_records_salt_and_params() {
        let mut e = engine();
        let record = e.initialize(b"pw", &[2u8; 16]).unwrap();
        assert_eq!(record.salt, vec![2u8; 16]);
        assert_eq!(e.kdf_record(), Some(&record));
    }

    #[test]
    fn initialize_with_auth_hash_matches_separate_calls() {
        let salt = [5u8; 16];
        let mut a = engine();
        let auth = a.initialize_with_auth_hash(b"pw", &salt).unwrap();

        let mut b = engine();
        b.initialize(b"pw", &salt).unwrap();
        assert_eq!(a.key().unwrap().as_bytes(), b.key().unwrap().as_bytes());
        assert_eq!(auth, b.generate_auth_hash(b"pw", &salt).unwrap());
    }
}
