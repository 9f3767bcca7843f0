//! Backend collaborator contract.
//!
//! The core never talks HTTP itself.  The host injects a [`Transport`]
//! that carries salts, auth hashes and opaque [`VaultItem`] records to
//! and from the server.  Nothing passed through it is secret: the
//! server only ever sees ciphertext, salts and the auth hash.

pub mod memory;

use async_trait::async_trait;

use crate::crypto::AuthHash;
use crate::errors::Result;
use crate::vault::VaultItem;

pub use memory::MemoryTransport;

/// Answer to a salt lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltResponse {
    pub user_id: String,
    pub salt: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET salt+userId`.  `Ok(None)` when the identifier is unknown.
    async fn fetch_salt(&self, identifier: &str) -> Result<Option<SaltResponse>>;

    /// `POST verify(authHash)`.
    async fn verify_auth_hash(&self, user_id: &str, auth_hash: &AuthHash) -> Result<bool>;

    async fn list_items(&self, user_id: &str) -> Result<Vec<VaultItem>>;

    async fn get_item(&self, user_id: &str, item_id: &str) -> Result<Option<VaultItem>>;

    /// Create or replace.  Returns the record as stored by the server.
    async fn upsert_item(&self, user_id: &str, item: VaultItem) -> Result<VaultItem>;

    /// Deleting an unknown id is not an error.
    async fn delete_item(&self, user_id: &str, item_id: &str) -> Result<()>;
}
