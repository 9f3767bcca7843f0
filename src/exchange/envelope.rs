//! Key-wrap envelope for cross-device handoff.
//!
//! Wire format (JSON, byte fields base64):
//!
//! ```text
//! { "version": 2, "iv": .., "salt": .., "encryptedKey": ..,
//!   "senderPublicKeys": { "curve25519": <32 bytes>, "p384": <97 bytes> } }
//! ```
//!
//! `encryptedKey` is the AES-256-GCM ciphertext followed by its 16-byte
//! tag.  The version byte and both sender public keys are bound as
//! associated data, so swapping any of them breaks the tag.

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::encryption::{self, CipherVersion, EncryptOptions, EncryptedPayload, TAG_LEN};
use crate::crypto::kdf::SALT_LEN;
use crate::encoding::{base64_decode, base64_encode};
use crate::errors::{Result, ZkVaultError};

use super::hybrid::{derive_key_from_hybrid_secret, perform_hybrid_ecdh, KeyPurpose};
use super::keypair::{HybridKeyPair, HybridPublicKeys};

/// Envelope format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EnvelopeVersion {
    /// Ephemeral X25519 + P-384 ECDH, HKDF-SHA256, AES-256-GCM.
    HybridV2,
}

impl EnvelopeVersion {
    pub const CURRENT: Self = Self::HybridV2;
}

impl TryFrom<u8> for EnvelopeVersion {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::HybridV2),
            other => Err(format!("unsupported envelope version {other}")),
        }
    }
}

impl From<EnvelopeVersion> for u8 {
    fn from(v: EnvelopeVersion) -> Self {
        match v {
            EnvelopeVersion::HybridV2 => 2,
        }
    }
}

/// The artifact transported between devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyEnvelope {
    pub version: EnvelopeVersion,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub iv: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub encrypted_key: Vec<u8>,

    /// Ephemeral sender keys; the receiver needs them to redo the ECDH.
    pub sender_public_keys: HybridPublicKeys,
}

impl WrappedKeyEnvelope {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ZkVaultError::Serialization(format!("envelope: {e}")))
    }

    /// Parse an envelope.  Unknown versions and malformed input are
    /// unwrap failures.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| ZkVaultError::Unwrap(format!("bad envelope: {e}")))
    }

    fn associated_data(&self) -> Vec<u8> {
        associated_data(self.version, &self.sender_public_keys)
    }
}

fn associated_data(version: EnvelopeVersion, sender: &HybridPublicKeys) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + sender.curve25519.len() + sender.p384.len());
    aad.push(u8::from(version));
    aad.extend_from_slice(&sender.curve25519);
    aad.extend_from_slice(&sender.p384);
    aad
}

/// Wrap `key_to_wrap` for the holder of `peer` under the vault-key purpose.
pub fn wrap_key(key_to_wrap: &[u8], peer: &HybridPublicKeys) -> Result<WrappedKeyEnvelope> {
    wrap_key_for(KeyPurpose::VaultKeyWrap, key_to_wrap, peer)
}

/// Wrap a key under an explicit purpose.
///
/// A fresh ephemeral hybrid pair is generated for every call and dropped
/// afterwards, giving the sender side forward secrecy.
pub fn wrap_key_for(
    purpose: KeyPurpose,
    key_to_wrap: &[u8],
    peer: &HybridPublicKeys,
) -> Result<WrappedKeyEnvelope> {
    if key_to_wrap.is_empty() {
        return Err(ZkVaultError::InvalidInput("key to wrap is empty".into()));
    }

    let ephemeral = HybridKeyPair::generate();
    let sender_public_keys = ephemeral.public_keys();

    let shared = perform_hybrid_ecdh(&ephemeral, peer)?;
    let salt = crate::crypto::kdf::generate_salt();
    let wrapping_key = derive_key_from_hybrid_secret(&shared, &salt, purpose)?;

    let version = EnvelopeVersion::CURRENT;
    let aad = associated_data(version, &sender_public_keys);
    let payload = encryption::encrypt(
        wrapping_key.as_bytes(),
        key_to_wrap,
        EncryptOptions {
            compress: false,
            additional_data: Some(aad.as_slice()),
        },
    )?;

    let mut encrypted_key = payload.ciphertext;
    encrypted_key.extend_from_slice(&payload.tag);

    debug!(?purpose, "wrapped key for peer device");

    Ok(WrappedKeyEnvelope {
        version,
        iv: payload.iv,
        salt: salt.to_vec(),
        encrypted_key,
        sender_public_keys,
    })
}

/// Unwrap a vault key with the receiver's long-term pair.
pub fn unwrap_key(envelope: &WrappedKeyEnvelope, ours: &HybridKeyPair) -> Result<Zeroizing<Vec<u8>>> {
    unwrap_key_for(KeyPurpose::VaultKeyWrap, envelope, ours)
}

/// Unwrap under an explicit purpose.  Must match the purpose used to wrap.
pub fn unwrap_key_for(
    purpose: KeyPurpose,
    envelope: &WrappedKeyEnvelope,
    ours: &HybridKeyPair,
) -> Result<Zeroizing<Vec<u8>>> {
    match envelope.version {
        EnvelopeVersion::HybridV2 => unwrap_hybrid_v2(purpose, envelope, ours),
    }
}

fn unwrap_hybrid_v2(
    purpose: KeyPurpose,
    envelope: &WrappedKeyEnvelope,
    ours: &HybridKeyPair,
) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.salt.len() != SALT_LEN {
        return Err(ZkVaultError::Unwrap(format!(
            "envelope salt must be {SALT_LEN} bytes"
        )));
    }
    if envelope.encrypted_key.len() <= TAG_LEN {
        return Err(ZkVaultError::Unwrap("encrypted key is truncated".into()));
    }

    let shared = perform_hybrid_ecdh(ours, &envelope.sender_public_keys)
        .map_err(|e| ZkVaultError::Unwrap(format!("sender keys rejected: {e}")))?;
    let wrapping_key = derive_key_from_hybrid_secret(&shared, &envelope.salt, purpose)?;

    let split = envelope.encrypted_key.len() - TAG_LEN;
    let payload = EncryptedPayload {
        version: CipherVersion::V1,
        iv: envelope.iv.clone(),
        ciphertext: envelope.encrypted_key[..split].to_vec(),
        tag: envelope.encrypted_key[split..].to_vec(),
        compressed: false,
    };

    let aad = envelope.associated_data();
    encryption::decrypt(wrapping_key.as_bytes(), &payload, Some(aad.as_slice())).map_err(|e| match e {
        ZkVaultError::Authentication => {
            ZkVaultError::Unwrap("authentication failed: wrong device or tampered envelope".into())
        }
        other => ZkVaultError::Unwrap(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_purpose_cannot_be_unwrapped_as_vault_key() {
        let receiver = HybridKeyPair::generate();
        let env = wrap_key_for(KeyPurpose::ItemKeyWrap, &[7u8; 32], &receiver.public_keys()).unwrap();

        assert!(matches!(unwrap_key(&env, &receiver), Err(ZkVaultError::Unwrap(_))));
        let key = unwrap_key_for(KeyPurpose::ItemKeyWrap, &env, &receiver).unwrap();
        assert_eq!(key.as_slice(), &[7u8; 32]);
    }

    #[test]
    fn rejects_empty_key() {
        let receiver = HybridKeyPair::generate();
        assert!(wrap_key(&[], &receiver.public_keys()).is_err());
    }

    #[test]
    fn truncated_ciphertext_is_an_unwrap_error() {
        let receiver = HybridKeyPair::generate();
        let mut env = wrap_key(&[1u8; 32], &receiver.public_keys()).unwrap();
        env.encrypted_key.truncate(TAG_LEN);
        assert!(matches!(unwrap_key(&env, &receiver), Err(ZkVaultError::Unwrap(_))));
    }

    #[test]
    fn json_uses_camel_case_and_integer_version() {
        let receiver = HybridKeyPair::generate();
        let env = wrap_key(&[1u8; 32], &receiver.public_keys()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(value["version"], 2);
        assert!(value.get("encryptedKey").is_some());
        assert!(value["senderPublicKeys"].get("curve25519").is_some());
        assert!(value["senderPublicKeys"].get("p384").is_some());
    }

    #[test]
    fn unsupported_version_fails_to_parse_as_unwrap_error() {
        let receiver = HybridKeyPair::generate();
        let env = wrap_key(&[1u8; 32], &receiver.public_keys()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        value["version"] = serde_json::json!(3);

        let err = WrappedKeyEnvelope::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ZkVaultError::Unwrap(ref m) if m.contains("unsupported envelope version 3")));
    }
}
