//! Vault item types.
//!
//! A [`VaultItem`] is what the server stores: opaque ciphertext plus a
//! little non-sensitive metadata.  A [`DecryptedItem`] is its in-memory
//! plaintext twin and only ever lives in the session cache.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::EncryptedPayload;
use crate::errors::{Result, ZkVaultError};

/// Kind of record.  Part of the AEAD associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Login,
    SecureNote,
    Card,
    Identity,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::SecureNote => "secure_note",
            Self::Card => "card",
            Self::Identity => "identity",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ZkVaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "login" | "" => Ok(Self::Login),
            "secure_note" | "note" | "securenote" => Ok(Self::SecureNote),
            "card" => Ok(Self::Card),
            "identity" => Ok(Self::Identity),
            other => Err(ZkVaultError::InvalidInput(format!(
                "unknown item type '{other}'"
            ))),
        }
    }
}

/// A user-defined extra field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

impl fmt::Debug for CustomField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomField")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// The sensitive part of an item.  Serialized to JSON and encrypted as
/// a whole; never sent to the server in the clear.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ItemFields {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<CustomField>,
}

impl ItemFields {
    /// Only a display name; everything else empty.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            username: None,
            password: None,
            url: None,
            notes: None,
            custom: Vec::new(),
        }
    }

    /// Shorthand for a login item.
    pub fn login(name: &str, username: Option<&str>, password: &str, url: Option<&str>) -> Self {
        let mut fields = Self::named(name);
        fields.username = username.map(str::to_string);
        fields.password = Some(password.to_string());
        fields.url = url.map(str::to_string);
        fields
    }

    fn matches(&self, needle: &str) -> bool {
        let hit = |s: &str| s.to_lowercase().contains(needle);
        hit(&self.name)
            || self.username.as_deref().is_some_and(hit)
            || self.url.as_deref().is_some_and(hit)
            || self.notes.as_deref().is_some_and(hit)
            || self.custom.iter().any(|f| hit(&f.name))
    }
}

impl fmt::Debug for ItemFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemFields")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("url", &self.url)
            .field("notes", &self.notes.as_ref().map(|_| "[REDACTED]"))
            .field("custom", &self.custom.len())
            .finish()
    }
}

/// The record the server stores.  `encrypted_data` is opaque to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultItem {
    pub item_id: String,
    pub item_type: ItemType,
    pub encrypted_data: EncryptedPayload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Blinded hash of the item's domain for exact-match search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_hash: Option<String>,

    #[serde(default)]
    pub favorite: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VaultItem {
    /// Associated data binding the ciphertext to this record's identity.
    pub fn associated_data(&self) -> Vec<u8> {
        associated_data(&self.item_id, self.item_type)
    }
}

pub(crate) fn associated_data(item_id: &str, item_type: ItemType) -> Vec<u8> {
    format!("zkvault-item:{item_id}:{}", item_type.as_str()).into_bytes()
}

/// Cache-only plaintext view of a [`VaultItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedItem {
    pub item_id: String,
    pub item_type: ItemType,
    pub fields: ItemFields,
    pub folder_id: Option<String>,
    pub tags: Vec<String>,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DecryptedItem {
    pub(crate) fn from_parts(item: &VaultItem, fields: ItemFields) -> Self {
        Self {
            item_id: item.item_id.clone(),
            item_type: item.item_type,
            fields,
            folder_id: item.folder_id.clone(),
            tags: item.tags.clone(),
            favorite: item.favorite,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }

    /// Case-insensitive match on already-decrypted text.  `needle` must
    /// be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.fields.matches(needle) || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

/// Input to `save_item`.  Leave `item_id` empty to create a new item.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub item_id: Option<String>,
    pub item_type: ItemType,
    pub fields: ItemFields,
    pub folder_id: Option<String>,
    pub tags: Vec<String>,
    pub favorite: bool,
}

impl ItemDraft {
    pub fn new(item_type: ItemType, fields: ItemFields) -> Self {
        Self {
            item_id: None,
            item_type,
            fields,
            folder_id: None,
            tags: Vec::new(),
            favorite: false,
        }
    }

    /// A draft that overwrites an existing item.
    pub fn updating(item: &DecryptedItem) -> Self {
        Self {
            item_id: Some(item.item_id.clone()),
            item_type: item.item_type,
            fields: item.fields.clone(),
            folder_id: item.folder_id.clone(),
            tags: item.tags.clone(),
            favorite: item.favorite,
        }
    }
}

/// Reduce a URL or host to the bare registrable host used for search.
///
/// Strips scheme, credentials, `www.`, port, path, query and fragment;
/// lowercases.  Returns `None` when nothing host-like remains.
pub fn normalize_domain(url: &str) -> Option<String> {
    let rest = url.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, r)| r);
    let rest = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    let host = rest.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if host.is_empty() || !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        return None;
    }
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_domain_strips_noise() {
        assert_eq!(
            normalize_domain("https://www.Bank.com:443/login?next=/"),
            Some("bank.com".into())
        );
        assert_eq!(normalize_domain("bank.com"), Some("bank.com".into()));
        assert_eq!(
            normalize_domain("ftp://user:pw@files.example.org/x"),
            Some("files.example.org".into())
        );
        assert_eq!(normalize_domain("   "), None);
        assert_eq!(normalize_domain("https:///path"), None);
    }

    #[test]
    fn item_type_parsing() {
        assert_eq!("login".parse::<ItemType>().unwrap(), ItemType::Login);
        assert_eq!("Note".parse::<ItemType>().unwrap(), ItemType::SecureNote);
        assert!("spaceship".parse::<ItemType>().is_err());
    }

    #[test]
    fn associated_data_includes_id_and_type() {
        let a = associated_data("abc", ItemType::Login);
        let b = associated_data("abc", ItemType::Card);
        let c = associated_data("abd", ItemType::Login);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fields_debug_hides_password() {
        let fields = ItemFields::login("Bank", Some("me"), "p@ss", None);
        let dbg = format!("{fields:?}");
        assert!(!dbg.contains("p@ss"));
        assert!(dbg.contains("Bank"));
    }

    #[test]
    fn fields_json_omits_empty_optionals() {
        let fields = ItemFields::named("Note");
        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"name":"Note"}"#);
    }
}
