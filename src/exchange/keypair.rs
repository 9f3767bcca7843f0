//! Hybrid device key pairs: one X25519 pair and one P-384 pair.

use std::fmt;

use aes_gcm::aead::OsRng;
use p384::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519Secret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::{base64_decode, base64_encode};
use crate::errors::{Result, ZkVaultError};

/// X25519 public key length.
pub const X25519_PUBLIC_LEN: usize = 32;

/// Uncompressed SEC1 P-384 point length (0x04 || x || y).
pub const P384_PUBLIC_LEN: usize = 97;

/// P-384 scalar length.
pub const P384_SECRET_LEN: usize = 48;

/// The public half of a hybrid pair, as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridPublicKeys {
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub curve25519: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub p384: Vec<u8>,
}

impl HybridPublicKeys {
    pub(crate) fn x25519(&self) -> Result<X25519PublicKey> {
        let bytes: [u8; X25519_PUBLIC_LEN] = self.curve25519.as_slice().try_into().map_err(|_| {
            ZkVaultError::InvalidInput(format!(
                "curve25519 public key must be {X25519_PUBLIC_LEN} bytes (got {})",
                self.curve25519.len()
            ))
        })?;
        Ok(X25519PublicKey::from(bytes))
    }

    pub(crate) fn p384(&self) -> Result<p384::PublicKey> {
        if self.p384.len() != P384_PUBLIC_LEN {
            return Err(ZkVaultError::InvalidInput(format!(
                "p384 public key must be {P384_PUBLIC_LEN} bytes uncompressed (got {})",
                self.p384.len()
            )));
        }
        p384::PublicKey::from_sec1_bytes(&self.p384)
            .map_err(|_| ZkVaultError::InvalidInput("p384 public key is not on the curve".into()))
    }

    /// Check both keys parse; used before storing a peer's keys.
    pub fn validate(&self) -> Result<()> {
        self.x25519()?;
        self.p384()?;
        Ok(())
    }
}

/// Serialized private half, for handing to a `KeyStore`.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct HybridPrivateKeys {
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    curve25519: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    p384: Vec<u8>,
}

impl fmt::Debug for HybridPrivateKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HybridPrivateKeys([REDACTED])")
    }
}

/// A device's long-term (or a sender's ephemeral) hybrid key pair.
///
/// Both secret halves zeroize themselves on drop.
#[derive(Clone)]
pub struct HybridKeyPair {
    curve25519: X25519Secret,
    curve25519_public: X25519PublicKey,
    p384: p384::SecretKey,
}

impl HybridKeyPair {
    /// Generate two independent pairs on two independent curves.
    pub fn generate() -> Self {
        let curve25519 = X25519Secret::random_from_rng(OsRng);
        let curve25519_public = X25519PublicKey::from(&curve25519);
        let p384 = p384::SecretKey::random(&mut OsRng);
        Self {
            curve25519,
            curve25519_public,
            p384,
        }
    }

    pub fn public_keys(&self) -> HybridPublicKeys {
        HybridPublicKeys {
            curve25519: self.curve25519_public.as_bytes().to_vec(),
            p384: self
                .p384
                .public_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        }
    }

    pub fn private_keys(&self) -> HybridPrivateKeys {
        HybridPrivateKeys {
            curve25519: self.curve25519.to_bytes().to_vec(),
            p384: self.p384.to_bytes().to_vec(),
        }
    }

    pub fn from_private_keys(keys: &HybridPrivateKeys) -> Result<Self> {
        let mut x_bytes: [u8; 32] = keys.curve25519.as_slice().try_into().map_err(|_| {
            ZkVaultError::InvalidInput("curve25519 private key must be 32 bytes".into())
        })?;
        let curve25519 = X25519Secret::from(x_bytes);
        x_bytes.zeroize();

        if keys.p384.len() != P384_SECRET_LEN {
            return Err(ZkVaultError::InvalidInput(format!(
                "p384 private key must be {P384_SECRET_LEN} bytes"
            )));
        }
        let p384 = p384::SecretKey::from_slice(&keys.p384)
            .map_err(|_| ZkVaultError::InvalidInput("p384 private key is out of range".into()))?;

        Ok(Self {
            curve25519_public: X25519PublicKey::from(&curve25519),
            curve25519,
            p384,
        })
    }

    pub(crate) fn curve25519_secret(&self) -> &X25519Secret {
        &self.curve25519
    }

    pub(crate) fn p384_secret(&self) -> &p384::SecretKey {
        &self.p384
    }
}

impl fmt::Debug for HybridKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridKeyPair")
            .field("public", &self.public_keys())
            .finish_non_exhaustive()
    }
}
