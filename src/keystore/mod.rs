//! Platform secret storage.
//!
//! The host picks one [`KeyStore`] backend at startup and injects it.
//! The core stores only wrapped keys and device identities here, never
//! the raw vault key.
//!
//! - [`MemoryKeyStore`]: process-local, for tests and headless hosts
//! - [`OsKeyStore`]: macOS Keychain, Windows Credential Manager or Linux
//!   Secret Service (feature `keyring-store`)

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroizing;

use crate::errors::{Result, ZkVaultError};
use crate::exchange::{HybridKeyPair, HybridPrivateKeys};

/// Service name used for OS keyring entries.
pub const SERVICE_NAME: &str = "zkvault";

/// Key-store id under which a user's wrapped vault key lives.
pub fn wrapped_key_id(user_id: &str) -> String {
    format!("zkvault:wrapped-key:{user_id}")
}

/// Key-store id for this device's long-term hybrid key pair.
pub fn device_keys_id(device_id: &str) -> String {
    format!("zkvault:device-keys:{device_id}")
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn store(&self, id: &str, bytes: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `id`.
    async fn retrieve(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Deleting a missing entry is not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Whether entries are protected by hardware-backed storage.
    async fn hardware_available(&self) -> bool;
}

/// Entries live in process memory and vanish on exit.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn store(&self, id: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), Zeroizing::new(bytes.to_vec()));
        Ok(())
    }

    async fn retrieve(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    async fn hardware_available(&self) -> bool {
        false
    }
}

/// OS credential store.  Every call fails gracefully: if the platform
/// keyring is unavailable the error is returned and the host can fall
/// back to a password unlock.
#[cfg(feature = "keyring-store")]
#[derive(Debug, Default, Clone, Copy)]
pub struct OsKeyStore;

#[cfg(feature = "keyring-store")]
impl OsKeyStore {
    fn entry(id: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(SERVICE_NAME, id)
            .map_err(|e| ZkVaultError::KeyStore(format!("failed to create keyring entry: {e}")))
    }
}

#[cfg(feature = "keyring-store")]
#[async_trait]
impl KeyStore for OsKeyStore {
    async fn store(&self, id: &str, bytes: &[u8]) -> Result<()> {
        Self::entry(id)?
            .set_secret(bytes)
            .map_err(|e| ZkVaultError::KeyStore(format!("failed to store in keyring: {e}")))
    }

    async fn retrieve(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        match Self::entry(id)?.get_secret() {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ZkVaultError::KeyStore(format!(
                "failed to read from keyring: {e}"
            ))),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match Self::entry(id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ZkVaultError::KeyStore(format!(
                "failed to delete from keyring: {e}"
            ))),
        }
    }

    async fn hardware_available(&self) -> bool {
        cfg!(any(target_os = "macos", target_os = "ios"))
    }
}

/// This device's long-term hybrid identity, persisted in a [`KeyStore`].
pub struct DeviceIdentity {
    pub device_id: String,
    pub keys: HybridKeyPair,
}

impl DeviceIdentity {
    /// Load the device pair stored under `device_id`, or generate and
    /// store a new one.
    pub async fn load_or_create(store: &dyn KeyStore, device_id: &str) -> Result<Self> {
        let id = device_keys_id(device_id);

        if let Some(bytes) = store.retrieve(&id).await? {
            let private: HybridPrivateKeys = serde_json::from_slice(&bytes).map_err(|e| {
                ZkVaultError::KeyStore(format!("stored device keys are unreadable: {e}"))
            })?;
            let keys = HybridKeyPair::from_private_keys(&private)?;
            debug!(device_id, "loaded device identity");
            return Ok(Self {
                device_id: device_id.to_string(),
                keys,
            });
        }

        let keys = HybridKeyPair::generate();
        let json = Zeroizing::new(
            serde_json::to_vec(&keys.private_keys())
                .map_err(|e| ZkVaultError::Serialization(format!("device keys: {e}")))?,
        );
        store.store(&id, &json).await?;
        debug!(device_id, "created device identity");

        Ok(Self {
            device_id: device_id.to_string(),
            keys,
        })
    }

    /// Remove the stored pair.  The in-memory copy is dropped with `self`.
    pub async fn forget(self, store: &dyn KeyStore) -> Result<()> {
        store.delete(&device_keys_id(&self.device_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip_and_delete() {
        let store = MemoryKeyStore::new();
        assert!(store.retrieve("k").await.unwrap().is_none());

        store.store("k", b"wrapped").await.unwrap();
        assert_eq!(store.retrieve("k").await.unwrap().unwrap().as_slice(), b"wrapped");

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.is_empty());
        assert!(!store.hardware_available().await);
    }

    #[tokio::test]
    async fn device_identity_is_stable_across_loads() {
        let store = MemoryKeyStore::new();
        let first = DeviceIdentity::load_or_create(&store, "laptop").await.unwrap();
        let second = DeviceIdentity::load_or_create(&store, "laptop").await.unwrap();
        assert_eq!(first.keys.public_keys(), second.keys.public_keys());

        let other = DeviceIdentity::load_or_create(&store, "phone").await.unwrap();
        assert_ne!(first.keys.public_keys(), other.keys.public_keys());
    }

    #[tokio::test]
    async fn forget_removes_stored_identity() {
        let store = MemoryKeyStore::new();
        let id = DeviceIdentity::load_or_create(&store, "tablet").await.unwrap();
        let public = id.keys.public_keys();
        id.forget(&store).await.unwrap();

        let fresh = DeviceIdentity::load_or_create(&store, "tablet").await.unwrap();
        assert_ne!(public, fresh.keys.public_keys());
    }

    #[test]
    fn ids_are_namespaced() {
        assert_eq!(wrapped_key_id("u1"), "zkvault:wrapped-key:u1");
        assert_eq!(device_keys_id("d1"), "zkvault:device-keys:d1");
    }
}
