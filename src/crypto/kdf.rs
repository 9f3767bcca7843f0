//! Password-based key derivation.
//!
//! Argon2id is the primary KDF.  PBKDF2-HMAC-SHA256 survives only as a
//! legacy path for bundles that explicitly record it; it is never picked
//! at runtime.  Both produce the 256-bit *root* from which the
//! encryption key and the auth hash are separated (see `keys`).

use argon2::{Algorithm, Argon2, Params, Version};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;
use zeroize::Zeroizing;

use crate::errors::{Result, ZkVaultError};

/// Length of freshly generated salts in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Shortest salt accepted from a server or a bundle.
pub const MIN_SALT_LEN: usize = 16;

/// Length of the derived root key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Largest memory cost accepted (1 GiB).  Bundles carry their own
/// parameters, so anything above this is refused rather than allocated.
pub const MAX_MEMORY_KIB: u32 = 1_048_576;

/// Largest Argon2 iteration count accepted.
pub const MAX_ITERATIONS: u32 = 64;

/// Largest Argon2 lane count accepted.
pub const MAX_PARALLELISM: u32 = 64;

/// Minimum PBKDF2 iteration count accepted on the legacy path.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Largest PBKDF2 iteration count accepted on the legacy path.
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Configurable Argon2id parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// The KDF invocation record stored next to every salt.
///
/// Parameters are part of the versioned format so they can be
/// strengthened later without breaking older envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KdfParams {
    Argon2idV1 {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
    /// Legacy compatibility only.
    Pbkdf2Sha256 { iterations: u32 },
}

impl From<Argon2Params> for KdfParams {
    fn from(p: Argon2Params) -> Self {
        Self::Argon2idV1 {
            memory_kib: p.memory_kib,
            iterations: p.iterations,
            parallelism: p.parallelism,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Argon2Params::default().into()
    }
}

/// Derive the 32-byte root key from a password and salt.
///
/// The same password + salt + params always produce the same root.
/// Fails on an empty password, a short salt, or parameters below the
/// enforced minimums.
pub fn derive_root_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    if password.is_empty() {
        return Err(ZkVaultError::KeyDerivation(
            "master password must not be empty".into(),
        ));
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(ZkVaultError::KeyDerivation(format!(
            "salt must be at least {MIN_SALT_LEN} bytes (got {})",
            salt.len()
        )));
    }

    match *params {
        KdfParams::Argon2idV1 {
            memory_kib,
            iterations,
            parallelism,
        } => derive_argon2id(
            password,
            salt,
            &Argon2Params {
                memory_kib,
                iterations,
                parallelism,
            },
        ),
        KdfParams::Pbkdf2Sha256 { iterations } => derive_pbkdf2(password, salt, iterations),
    }
}

fn derive_argon2id(
    password: &[u8],
    salt: &[u8],
    argon2_params: &Argon2Params,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    if argon2_params.memory_kib < MIN_MEMORY_KIB {
        return Err(ZkVaultError::KeyDerivation(format!(
            "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
            argon2_params.memory_kib
        )));
    }
    if argon2_params.iterations < 1 {
        return Err(ZkVaultError::KeyDerivation(
            "Argon2 iterations must be at least 1".into(),
        ));
    }
    if argon2_params.parallelism < 1 {
        return Err(ZkVaultError::KeyDerivation(
            "Argon2 parallelism must be at least 1".into(),
        ));
    }

    if argon2_params.memory_kib > MAX_MEMORY_KIB {
        return Err(ZkVaultError::KeyDerivation(format!(
            "Argon2 memory_kib must be at most {MAX_MEMORY_KIB} (got {})",
            argon2_params.memory_kib
        )));
    }
    if argon2_params.iterations > MAX_ITERATIONS {
        return Err(ZkVaultError::KeyDerivation(format!(
            "Argon2 iterations must be at most {MAX_ITERATIONS} (got {})",
            argon2_params.iterations
        )));
    }
    if argon2_params.parallelism > MAX_PARALLELISM {
        return Err(ZkVaultError::KeyDerivation(format!(
            "Argon2 parallelism must be at most {MAX_PARALLELISM} (got {})",
            argon2_params.parallelism
        )));
    }

    let recommended = Argon2Params::default();
    if argon2_params.memory_kib < recommended.memory_kib
        || argon2_params.iterations < recommended.iterations
    {
        warn!(
            memory_kib = argon2_params.memory_kib,
            iterations = argon2_params.iterations,
            "argon2 parameters below recommended production values"
        );
    }

    let params = Params::new(
        argon2_params.memory_kib,
        argon2_params.iterations,
        argon2_params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| ZkVaultError::KeyDerivation(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, key.as_mut())
        .map_err(|e| ZkVaultError::KeyDerivation(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

fn derive_pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    if iterations < MIN_PBKDF2_ITERATIONS {
        return Err(ZkVaultError::KeyDerivation(format!(
            "PBKDF2 iterations must be at least {MIN_PBKDF2_ITERATIONS} (got {iterations})"
        )));
    }
    if iterations > MAX_PBKDF2_ITERATIONS {
        return Err(ZkVaultError::KeyDerivation(format!(
            "PBKDF2 iterations must be at most {MAX_PBKDF2_ITERATIONS} (got {iterations})"
        )));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password, salt, iterations, key.as_mut());
    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}
