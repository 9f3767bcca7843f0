//! In-process stand-in for the vault server.
//!
//! Behaves like the real backend from the core's point of view: it holds
//! a salt and an auth-hash verifier per account plus opaque item records.
//! Every request the client sends is appended to an outbound log so
//! tests can check that nothing secret ever leaves the device.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::crypto::keys::derive_auth_hash;
use crate::crypto::{generate_salt, AuthHash, KdfParams};
use crate::errors::{Result, ZkVaultError};
use crate::vault::VaultItem;

use super::{SaltResponse, Transport};

struct Account {
    user_id: String,
    salt: Vec<u8>,
    /// SHA-256 of the auth hash; the server never stores the hash itself.
    verifier: [u8; 32],
}

#[derive(Default)]
struct ServerState {
    accounts: HashMap<String, Account>,
    items: HashMap<String, BTreeMap<String, VaultItem>>,
    outbound: Vec<String>,
    offline: bool,
}

/// Cloning shares the same server.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<ServerState>>,
}

fn verifier_for(auth_hash: &AuthHash) -> [u8; 32] {
    Sha256::digest(auth_hash.as_bytes()).into()
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn online(&self) -> Result<MutexGuard<'_, ServerState>> {
        let state = self.state();
        if state.offline {
            return Err(ZkVaultError::Transport("server unreachable".into()));
        }
        Ok(state)
    }

    /// Create an account with a fresh random salt.  Returns the user id.
    pub fn register(&self, identifier: &str, password: &[u8], params: &KdfParams) -> Result<String> {
        self.register_with_salt(identifier, password, &generate_salt(), params)
    }

    /// Create an account with a caller-chosen salt.
    pub fn register_with_salt(
        &self,
        identifier: &str,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<String> {
        // Registration happens client-side; only the hash reaches the server.
        let auth_hash = derive_auth_hash(password, salt, params)?;
        let user_id = uuid::Uuid::new_v4().to_string();

        let mut state = self.state();
        if state.accounts.contains_key(identifier) {
            return Err(ZkVaultError::InvalidInput(format!(
                "account '{identifier}' already exists"
            )));
        }
        state
            .outbound
            .push(format!("register {identifier} {}", hex::encode(auth_hash.as_bytes())));
        state.accounts.insert(
            identifier.to_string(),
            Account {
                user_id: user_id.clone(),
                salt: salt.to_vec(),
                verifier: verifier_for(&auth_hash),
            },
        );
        debug!(%user_id, "registered account");
        Ok(user_id)
    }

    /// Simulate losing connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Everything the client has sent, one entry per request.
    pub fn outbound_log(&self) -> Vec<String> {
        self.state().outbound.clone()
    }

    /// Raw server-side copy of an item, for tampering in tests.
    pub fn stored_item(&self, user_id: &str, item_id: &str) -> Option<VaultItem> {
        self.state()
            .items
            .get(user_id)
            .and_then(|items| items.get(item_id))
            .cloned()
    }

    /// Overwrite a stored record without going through the client.
    pub fn replace_stored_item(&self, user_id: &str, item: VaultItem) {
        self.state()
            .items
            .entry(user_id.to_string())
            .or_default()
            .insert(item.item_id.clone(), item);
    }

    pub fn item_count(&self, user_id: &str) -> usize {
        self.state().items.get(user_id).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch_salt(&self, identifier: &str) -> Result<Option<SaltResponse>> {
        let mut state = self.online()?;
        state.outbound.push(format!("salt {identifier}"));
        Ok(state.accounts.get(identifier).map(|a| SaltResponse {
            user_id: a.user_id.clone(),
            salt: a.salt.clone(),
        }))
    }

    async fn verify_auth_hash(&self, user_id: &str, auth_hash: &AuthHash) -> Result<bool> {
        let mut state = self.online()?;
        state
            .outbound
            .push(format!("verify {user_id} {}", hex::encode(auth_hash.as_bytes())));

        let presented = verifier_for(auth_hash);
        let valid = state
            .accounts
            .values()
            .find(|a| a.user_id == user_id)
            .is_some_and(|a| bool::from(a.verifier.ct_eq(&presented)));
        Ok(valid)
    }

    async fn list_items(&self, user_id: &str) -> Result<Vec<VaultItem>> {
        let mut state = self.online()?;
        state.outbound.push(format!("list {user_id}"));
        Ok(state
            .items
            .get(user_id)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_item(&self, user_id: &str, item_id: &str) -> Result<Option<VaultItem>> {
        let mut state = self.online()?;
        state.outbound.push(format!("get {user_id} {item_id}"));
        Ok(state.items.get(user_id).and_then(|items| items.get(item_id)).cloned())
    }

    async fn upsert_item(&self, user_id: &str, mut item: VaultItem) -> Result<VaultItem> {
        let mut state = self.online()?;
        let body = serde_json::to_string(&item)
            .map_err(|e| ZkVaultError::Serialization(format!("item record: {e}")))?;
        state.outbound.push(format!("upsert {user_id} {body}"));

        let items = state.items.entry(user_id.to_string()).or_default();
        let now = Utc::now();
        item.created_at = items.get(&item.item_id).map_or(item.created_at, |old| old.created_at);
        item.updated_at = item.updated_at.max(now);
        items.insert(item.item_id.clone(), item.clone());
        Ok(item)
    }

    async fn delete_item(&self, user_id: &str, item_id: &str) -> Result<()> {
        let mut state = self.online()?;
        state.outbound.push(format!("delete {user_id} {item_id}"));
        if let Some(items) = state.items.get_mut(user_id) {
            items.remove(item_id);
        }
        Ok(())
    }
}
