//! Hybrid (X25519 + P-384) key exchange for moving the vault key
//! between a user's devices.
//!
//! - `keypair`: hybrid key pairs and their wire/private encodings
//! - `hybrid`: per-curve ECDH and the HKDF combiner with purpose labels
//! - `envelope`: the versioned `WrappedKeyEnvelope` and wrap/unwrap

pub mod envelope;
pub mod hybrid;
pub mod keypair;

pub use envelope::{unwrap_key, unwrap_key_for, wrap_key, wrap_key_for, EnvelopeVersion, WrappedKeyEnvelope};
pub use hybrid::{derive_key_from_hybrid_secret, perform_hybrid_ecdh, HybridSharedSecret, KeyPurpose, WrappingKey};
pub use keypair::{HybridKeyPair, HybridPrivateKeys, HybridPublicKeys};
