//! Device key commands: `device-keygen`, `wrap-key`, `unwrap-key`.
//!
//! Files exchanged between devices:
//! - `<out>`: private keys, JSON, stays on the device
//! - `<out>.pub.json`: public keys, JSON, safe to share
//! - envelope: `WrappedKeyEnvelope` JSON

use std::fs;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::cli::{copy_to_clipboard, output, read_file};
use crate::errors::{Result, ZkVaultError};
use crate::exchange::{unwrap_key, wrap_key, HybridKeyPair, HybridPrivateKeys, HybridPublicKeys, WrappedKeyEnvelope};

/// Path of the public-key file written next to `out`.
pub fn public_key_path(out: &Path) -> PathBuf {
    let mut name = out.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".pub.json");
    out.with_file_name(name)
}

/// Execute the `device-keygen` command.
pub fn execute_keygen(out: &Path, force: bool) -> Result<()> {
    let pub_path = public_key_path(out);
    if !force && (out.exists() || pub_path.exists()) {
        return Err(ZkVaultError::CommandFailed(format!(
            "{} already exists — pass --force to overwrite",
            out.display()
        )));
    }

    let pair = HybridKeyPair::generate();
    let private = Zeroizing::new(
        serde_json::to_string_pretty(&pair.private_keys())
            .map_err(|e| ZkVaultError::Serialization(format!("device keys: {e}")))?,
    );
    let public = pair.public_keys();
    let public_json = serde_json::to_string_pretty(&public)
        .map_err(|e| ZkVaultError::Serialization(format!("public keys: {e}")))?;

    write_private(out, &private)?;
    fs::write(&pub_path, public_json)
        .map_err(|e| ZkVaultError::CommandFailed(format!("failed to write public keys: {e}")))?;

    output::success(&format!("Device keys written to {}", out.display()));
    output::print_public_keys(&public);
    output::tip(&format!("Share {} with the sending device.", pub_path.display()));
    Ok(())
}

/// Write a private file, readable by the owner only on Unix.
fn write_private(path: &Path, contents: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
    }
    #[cfg(not(unix))]
    fs::write(path, contents)?;
    Ok(())
}

/// Execute the `wrap-key` command.
pub fn execute_wrap(peer: &Path, key_hex: Option<&str>, out: Option<&Path>) -> Result<()> {
    let peer: HybridPublicKeys = serde_json::from_str(&read_file(peer)?)
        .map_err(|e| ZkVaultError::InvalidFormat(format!("peer public keys: {e}")))?;
    peer.validate()?;

    let key_hex = match key_hex {
        Some(k) => Zeroizing::new(k.to_string()),
        None => crate::cli::prompt_password("Key to wrap (hex)")?,
    };
    let key = Zeroizing::new(
        hex::decode(key_hex.trim())
            .map_err(|e| ZkVaultError::InvalidInput(format!("key is not valid hex: {e}")))?,
    );

    let envelope = wrap_key(&key, &peer)?.to_json()?;

    match out {
        Some(dest) => {
            fs::write(dest, &envelope).map_err(|e| {
                ZkVaultError::CommandFailed(format!("failed to write envelope: {e}"))
            })?;
            output::success(&format!("Wrapped {}-byte key into {}", key.len(), dest.display()));
        }
        None => println!("{envelope}"),
    }
    Ok(())
}

/// Execute the `unwrap-key` command.
pub fn execute_unwrap(envelope: &Path, keys: &Path, copy: bool) -> Result<()> {
    let envelope = WrappedKeyEnvelope::from_json(&read_file(envelope)?)?;
    let private_json = Zeroizing::new(read_file(keys)?);
    let private: HybridPrivateKeys = serde_json::from_str(&private_json)
        .map_err(|e| ZkVaultError::InvalidFormat(format!("device private keys: {e}")))?;
    let pair = HybridKeyPair::from_private_keys(&private)?;

    let key = unwrap_key(&envelope, &pair)?;
    let key_hex = Zeroizing::new(hex::encode(key.as_slice()));

    if copy {
        copy_to_clipboard(&key_hex)?;
        output::success(&format!("Unwrapped {}-byte key copied to the clipboard", key.len()));
    } else {
        output::warning("The unwrapped key is printed below. Clear your terminal afterwards.");
        println!("{}", key_hex.as_str());
    }
    Ok(())
}
