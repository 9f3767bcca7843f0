//! Integration tests for hybrid device key exchange.

use zkvault::errors::ZkVaultError;
use zkvault::exchange::{
    unwrap_key, unwrap_key_for, wrap_key, wrap_key_for, HybridKeyPair, HybridPrivateKeys,
    KeyPurpose, WrappedKeyEnvelope,
};

const VAULT_KEY: [u8; 32] = [0x5Au8; 32];

// ---------------------------------------------------------------------------
// Round-trip
// ---------------------------------------------------------------------------

#[test]
fn wrap_unwrap_roundtrip() {
    let device = HybridKeyPair::generate();
    let envelope = wrap_key(&VAULT_KEY, &device.public_keys()).expect("wrap should succeed");

    let key = unwrap_key(&envelope, &device).expect("unwrap should succeed");
    assert_eq!(key.as_slice(), &VAULT_KEY);
}

#[test]
fn envelope_survives_json_transport() {
    let device = HybridKeyPair::generate();
    let json = wrap_key(&VAULT_KEY, &device.public_keys())
        .expect("wrap")
        .to_json()
        .expect("to json");

    assert!(json.contains("\"senderPublicKeys\""));
    assert!(json.contains("\"version\":2"));

    let envelope = WrappedKeyEnvelope::from_json(&json).expect("from json");
    let key = unwrap_key(&envelope, &device).expect("unwrap");
    assert_eq!(key.as_slice(), &VAULT_KEY);
}

#[test]
fn device_keys_restored_from_private_encoding_still_unwrap() {
    let device = HybridKeyPair::generate();
    let stored = serde_json::to_string(&device.private_keys()).expect("serialize");
    let envelope = wrap_key(&VAULT_KEY, &device.public_keys()).expect("wrap");

    let private: HybridPrivateKeys = serde_json::from_str(&stored).expect("deserialize");
    let restored = HybridKeyPair::from_private_keys(&private).expect("restore");
    assert_eq!(restored.public_keys(), device.public_keys());
    assert_eq!(unwrap_key(&envelope, &restored).expect("unwrap").as_slice(), &VAULT_KEY);
}

#[test]
fn every_wrap_uses_a_fresh_ephemeral_pair() {
    let device = HybridKeyPair::generate();
    let a = wrap_key(&VAULT_KEY, &device.public_keys()).expect("wrap a");
    let b = wrap_key(&VAULT_KEY, &device.public_keys()).expect("wrap b");

    assert_ne!(a.sender_public_keys, b.sender_public_keys);
    assert_ne!(a.salt, b.salt);
    assert_ne!(a.encrypted_key, b.encrypted_key);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn wrong_device_cannot_unwrap() {
    let intended = HybridKeyPair::generate();
    let other = HybridKeyPair::generate();
    let envelope = wrap_key(&VAULT_KEY, &intended.public_keys()).expect("wrap");

    assert!(matches!(
        unwrap_key(&envelope, &other),
        Err(ZkVaultError::Unwrap(_))
    ));
}

#[test]
fn purposes_do_not_cross() {
    let device = HybridKeyPair::generate();
    let envelope =
        wrap_key_for(KeyPurpose::ItemKeyWrap, &VAULT_KEY, &device.public_keys()).expect("wrap");

    assert!(matches!(
        unwrap_key_for(KeyPurpose::VaultKeyWrap, &envelope, &device),
        Err(ZkVaultError::Unwrap(_))
    ));
    assert!(unwrap_key_for(KeyPurpose::ItemKeyWrap, &envelope, &device).is_ok());
}

#[test]
fn swapping_either_sender_key_breaks_unwrap() {
    let device = HybridKeyPair::generate();
    let envelope = wrap_key(&VAULT_KEY, &device.public_keys()).expect("wrap");
    let stranger = HybridKeyPair::generate().public_keys();

    // Both curves contribute: replacing only one half is enough to fail.
    let mut only_x25519 = envelope.clone();
    only_x25519.sender_public_keys.curve25519 = stranger.curve25519.clone();
    assert!(matches!(
        unwrap_key(&only_x25519, &device),
        Err(ZkVaultError::Unwrap(_))
    ));

    let mut only_p384 = envelope;
    only_p384.sender_public_keys.p384 = stranger.p384;
    assert!(matches!(
        unwrap_key(&only_p384, &device),
        Err(ZkVaultError::Unwrap(_))
    ));
}

#[test]
fn tampered_ciphertext_or_salt_breaks_unwrap() {
    let device = HybridKeyPair::generate();
    let envelope = wrap_key(&VAULT_KEY, &device.public_keys()).expect("wrap");

    let mut bad_key = envelope.clone();
    bad_key.encrypted_key[0] ^= 0x01;
    assert!(unwrap_key(&bad_key, &device).is_err());

    let mut bad_salt = envelope;
    bad_salt.salt[0] ^= 0x01;
    assert!(unwrap_key(&bad_salt, &device).is_err());
}

#[test]
fn unknown_version_is_refused_at_parse() {
    let device = HybridKeyPair::generate();
    let json = wrap_key(&VAULT_KEY, &device.public_keys())
        .expect("wrap")
        .to_json()
        .expect("json");
    let downgraded = json.replace("\"version\":2", "\"version\":1");

    assert!(matches!(
        WrappedKeyEnvelope::from_json(&downgraded),
        Err(ZkVaultError::Unwrap(_))
    ));
}

#[test]
fn empty_key_is_invalid_input() {
    let device = HybridKeyPair::generate();
    assert!(matches!(
        wrap_key(&[], &device.public_keys()),
        Err(ZkVaultError::InvalidInput(_))
    ));
}
