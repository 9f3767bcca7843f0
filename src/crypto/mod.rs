//! Cryptographic primitives for the vault core.
//!
//! This module provides:
//! - Argon2id (and legacy PBKDF2) password-based key derivation (`kdf`)
//! - HKDF domain separation into encryption key, auth hash and search key (`keys`)
//! - AES-256-GCM encryption and decryption with associated data (`encryption`)
//! - The per-session `CryptoEngine` that owns the vault key (`engine`)
//! - A local random password generator (`password`)

pub mod encryption;
pub mod engine;
pub mod kdf;
pub mod keys;
pub mod password;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, CryptoEngine, ...};
pub use encryption::{decrypt, encrypt, CipherVersion, EncryptOptions, EncryptedPayload};
pub use engine::{CryptoEngine, KdfRecord};
pub use kdf::{derive_root_key, generate_salt, Argon2Params, KdfParams, MIN_SALT_LEN};
pub use keys::{AuthHash, DerivedKey, SearchKey};
pub use password::{generate_password, PasswordOptions};
