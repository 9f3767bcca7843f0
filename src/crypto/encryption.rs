//! AES-256-GCM authenticated encryption.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce.  The
//! result is an [`EncryptedPayload`] carrying the nonce, the ciphertext
//! and the 16-byte tag as separate fields plus a format version, so
//! stored blobs stay decodable after algorithm changes.
//!
//! Optional associated data is authenticated but not encrypted; vault
//! items bind `{item_id, item_type}` this way so ciphertexts cannot be
//! swapped between records unnoticed.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encoding::{base64_decode, base64_encode};
use crate::errors::{Result, ZkVaultError};

/// Size of the AES-256-GCM nonce in bytes.
pub const IV_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// zstd level used for optional compression.
const COMPRESSION_LEVEL: i32 = 3;

/// Ciphertext format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CipherVersion {
    /// AES-256-GCM, 96-bit random IV, optional zstd pre-compression.
    V1,
}

impl CipherVersion {
    pub const CURRENT: Self = Self::V1;
}

impl TryFrom<u8> for CipherVersion {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            other => Err(format!("unsupported ciphertext version {other}")),
        }
    }
}

impl From<CipherVersion> for u8 {
    fn from(v: CipherVersion) -> Self {
        match v {
            CipherVersion::V1 => 1,
        }
    }
}

/// An authenticated ciphertext as stored on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub version: CipherVersion,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub iv: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub tag: Vec<u8>,

    /// Whether the plaintext was zstd-compressed before encryption.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub compressed: bool,
}

/// Knobs for a single `encrypt` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptOptions<'a> {
    pub compress: bool,
    pub additional_data: Option<&'a [u8]>,
}

/// Encrypt `plaintext` with a 32-byte `key`.
pub fn encrypt(key: &[u8], plaintext: &[u8], options: EncryptOptions<'_>) -> Result<EncryptedPayload> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ZkVaultError::Encryption(format!("invalid key length: {e}")))?;

    let compressed_buf;
    let body: &[u8] = if options.compress {
        compressed_buf = Zeroizing::new(
            zstd::encode_all(plaintext, COMPRESSION_LEVEL)
                .map_err(|e| ZkVaultError::Encryption(format!("compression failed: {e}")))?,
        );
        &compressed_buf
    } else {
        plaintext
    };

    // Fresh nonce per call; a (key, nonce) pair is never reused.
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut sealed = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: body,
                aad: options.additional_data.unwrap_or_default(),
            },
        )
        .map_err(|e| ZkVaultError::Encryption(format!("encryption error: {e}")))?;

    // aes-gcm appends the tag; store it as its own field.
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EncryptedPayload {
        version: CipherVersion::CURRENT,
        iv: nonce.to_vec(),
        ciphertext: sealed,
        tag,
        compressed: options.compress,
    })
}

/// Decrypt a payload produced by [`encrypt`].
///
/// Any tag mismatch, including one caused by different associated
/// data, yields [`ZkVaultError::Authentication`] and never partial
/// plaintext.
pub fn decrypt(
    key: &[u8],
    payload: &EncryptedPayload,
    additional_data: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    match payload.version {
        CipherVersion::V1 => decrypt_v1(key, payload, additional_data),
    }
}

fn decrypt_v1(
    key: &[u8],
    payload: &EncryptedPayload,
    additional_data: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    if payload.iv.len() != IV_LEN || payload.tag.len() != TAG_LEN {
        return Err(ZkVaultError::Authentication);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ZkVaultError::Authentication)?;

    let mut sealed = Vec::with_capacity(payload.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&payload.ciphertext);
    sealed.extend_from_slice(&payload.tag);

    let body = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(&payload.iv),
                Payload {
                    msg: &sealed,
                    aad: additional_data.unwrap_or_default(),
                },
            )
            .map_err(|_| ZkVaultError::Authentication)?,
    );

    if !payload.compressed {
        return Ok(body);
    }

    zstd::decode_all(body.as_slice())
        .map(Zeroizing::new)
        .map_err(|e| ZkVaultError::InvalidFormat(format!("decompression failed: {e}")))
}
