//! Dual-curve ECDH and HKDF combination.
//!
//! Two shared secrets are computed independently, one per curve, and
//! kept apart until [`derive_key_from_hybrid_secret`] concatenates them
//! as HKDF input.  Recovering the wrapping key therefore needs *both*
//! secrets: breaking one curve alone is not enough.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::errors::{Result, ZkVaultError};

use super::keypair::{HybridKeyPair, HybridPublicKeys, P384_SECRET_LEN};

/// Symmetric key length produced by the combiner.
pub const WRAPPING_KEY_LEN: usize = 32;

/// What a derived wrapping key is for.
///
/// Every purpose maps to its own HKDF `info` label.  Callers pick a
/// purpose, never a raw label, so a key cannot be derived under one
/// label and used for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// Handing the vault key to another of the user's devices.
    VaultKeyWrap,
    /// Sharing an individual item key.
    ItemKeyWrap,
}

impl KeyPurpose {
    pub const fn info(self) -> &'static [u8] {
        match self {
            Self::VaultKeyWrap => b"zkvault:key-wrap-v2",
            Self::ItemKeyWrap => b"zkvault:item-key-wrap-v2",
        }
    }
}

/// The two per-curve ECDH outputs, not yet combined.
pub struct HybridSharedSecret {
    curve25519: Zeroizing<[u8; 32]>,
    p384: Zeroizing<[u8; P384_SECRET_LEN]>,
}

impl HybridSharedSecret {
    pub fn curve25519(&self) -> &[u8; 32] {
        &self.curve25519
    }

    pub fn p384(&self) -> &[u8; P384_SECRET_LEN] {
        &self.p384
    }
}

/// A key bound to exactly one [`KeyPurpose`].  Its bytes never leave
/// the crate.
pub struct WrappingKey {
    bytes: Zeroizing<[u8; WRAPPING_KEY_LEN]>,
    purpose: KeyPurpose,
}

impl WrappingKey {
    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    pub(crate) fn as_bytes(&self) -> &[u8; WRAPPING_KEY_LEN] {
        &self.bytes
    }
}

/// Perform ECDH on each curve independently.
pub fn perform_hybrid_ecdh(ours: &HybridKeyPair, peer: &HybridPublicKeys) -> Result<HybridSharedSecret> {
    let peer_x = peer.x25519()?;
    let peer_p = peer.p384()?;

    let x_shared = ours.curve25519_secret().diffie_hellman(&peer_x);
    // A low-order peer point would force an all-zero secret.
    if !x_shared.was_contributory() {
        return Err(ZkVaultError::InvalidInput(
            "curve25519 peer key is a low-order point".into(),
        ));
    }

    let p_shared =
        p384::ecdh::diffie_hellman(ours.p384_secret().to_nonzero_scalar(), peer_p.as_affine());

    let mut p384 = Zeroizing::new([0u8; P384_SECRET_LEN]);
    p384.copy_from_slice(p_shared.raw_secret_bytes());

    Ok(HybridSharedSecret {
        curve25519: Zeroizing::new(*x_shared.as_bytes()),
        p384,
    })
}

/// HKDF-SHA256 over `curve25519_secret || p384_secret`.
pub fn derive_key_from_hybrid_secret(
    secret: &HybridSharedSecret,
    salt: &[u8],
    purpose: KeyPurpose,
) -> Result<WrappingKey> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(32 + P384_SECRET_LEN));
    ikm.extend_from_slice(&secret.curve25519[..]);
    ikm.extend_from_slice(&secret.p384[..]);

    let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut okm = Zeroizing::new([0u8; WRAPPING_KEY_LEN]);
    hk.expand(purpose.info(), okm.as_mut())
        .map_err(|e| ZkVaultError::KeyDerivation(format!("HKDF expand failed: {e}")))?;

    Ok(WrappingKey {
        bytes: okm,
        purpose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree_on_each_curve() {
        let alice = HybridKeyPair::generate();
        let bob = HybridKeyPair::generate();

        let ab = perform_hybrid_ecdh(&alice, &bob.public_keys()).unwrap();
        let ba = perform_hybrid_ecdh(&bob, &alice.public_keys()).unwrap();

        assert_eq!(ab.curve25519(), ba.curve25519());
        assert_eq!(ab.p384(), ba.p384());
        assert_ne!(&ab.curve25519()[..], &ab.p384()[..32]);
    }

    #[test]
    fn purposes_produce_unrelated_keys() {
        let alice = HybridKeyPair::generate();
        let bob = HybridKeyPair::generate();
        let secret = perform_hybrid_ecdh(&alice, &bob.public_keys()).unwrap();

        let wrap = derive_key_from_hybrid_secret(&secret, b"salt", KeyPurpose::VaultKeyWrap).unwrap();
        let item = derive_key_from_hybrid_secret(&secret, b"salt", KeyPurpose::ItemKeyWrap).unwrap();
        assert_eq!(wrap.purpose(), KeyPurpose::VaultKeyWrap);
        assert_ne!(wrap.as_bytes(), item.as_bytes());
    }

    #[test]
    fn one_curve_secret_is_not_enough() {
        let alice = HybridKeyPair::generate();
        let bob = HybridKeyPair::generate();
        let real = perform_hybrid_ecdh(&alice, &bob.public_keys()).unwrap();

        // Attacker who knows the P-384 secret but guesses the X25519 half.
        let forged = HybridSharedSecret {
            curve25519: Zeroizing::new([0u8; 32]),
            p384: Zeroizing::new(*real.p384()),
        };

        let k_real = derive_key_from_hybrid_secret(&real, b"s", KeyPurpose::VaultKeyWrap).unwrap();
        let k_forged = derive_key_from_hybrid_secret(&forged, b"s", KeyPurpose::VaultKeyWrap).unwrap();
        assert_ne!(k_real.as_bytes(), k_forged.as_bytes());
    }

    #[test]
    fn salt_changes_the_key() {
        let alice = HybridKeyPair::generate();
        let bob = HybridKeyPair::generate();
        let secret = perform_hybrid_ecdh(&alice, &bob.public_keys()).unwrap();
        let a = derive_key_from_hybrid_secret(&secret, b"one", KeyPurpose::VaultKeyWrap).unwrap();
        let b = derive_key_from_hybrid_secret(&secret, b"two", KeyPurpose::VaultKeyWrap).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn low_order_curve25519_point_is_rejected() {
        let ours = HybridKeyPair::generate();
        let mut peer = HybridKeyPair::generate().public_keys();
        peer.curve25519 = vec![0u8; 32];
        assert!(perform_hybrid_ecdh(&ours, &peer).is_err());
    }
}
