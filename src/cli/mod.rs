//! CLI module: Clap argument parser, output helpers, and command implementations.
//!
//! The binary is a thin local tool around the library.  It never talks
//! to a server; it covers the pieces that are useful offline.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{Result, ZkVaultError};

/// zkvault: zero-knowledge vault tooling.
#[derive(Parser)]
#[command(
    name = "zkvault",
    about = "Zero-knowledge vault tooling: passwords, device keys and exports",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory containing zkvault.toml (default: current directory)
    #[arg(long, default_value = ".", global = true)]
    pub config_dir: PathBuf,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a random password
    GeneratePassword {
        /// Password length (default from zkvault.toml, else 20)
        #[arg(short, long)]
        length: Option<usize>,

        /// Leave out symbols
        #[arg(long)]
        no_symbols: bool,

        /// Leave out look-alike characters (0/O, 1/l/I, ...)
        #[arg(long)]
        no_ambiguous: bool,

        /// Copy to the clipboard instead of printing
        #[arg(short, long)]
        copy: bool,
    },

    /// Generate a long-term hybrid device key pair
    DeviceKeygen {
        /// Where to write the private keys (JSON)
        #[arg(short, long)]
        out: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Wrap a key for another device
    WrapKey {
        /// The receiving device's public keys (JSON)
        #[arg(long)]
        peer: PathBuf,

        /// Key to wrap, hex-encoded (omit for interactive prompt)
        #[arg(long, env = "ZKVAULT_WRAP_KEY", hide_env_values = true)]
        key_hex: Option<String>,

        /// Write the envelope here (prints to stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Unwrap a key envelope with this device's private keys
    UnwrapKey {
        /// Envelope produced by `wrap-key`
        #[arg(long)]
        envelope: PathBuf,

        /// This device's private keys (from `device-keygen`)
        #[arg(long)]
        keys: PathBuf,

        /// Copy the key to the clipboard instead of printing it
        #[arg(short, long)]
        copy: bool,
    },

    /// Show the items in an export file (passwords are never shown)
    InspectExport {
        /// Path to the export
        file: PathBuf,

        /// Export format: json or csv (auto-detected if omitted)
        #[arg(short, long)]
        format: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

impl Cli {
    pub fn settings(&self) -> Result<Settings> {
        Settings::load(&self.config_dir)
    }
}

/// Get a password, trying `ZKVAULT_PASSWORD` first, then an interactive
/// prompt.
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("ZKVAULT_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| ZkVaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Put `text` on the system clipboard.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| ZkVaultError::CommandFailed(format!("clipboard unavailable: {e}")))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| ZkVaultError::CommandFailed(format!("failed to copy to clipboard: {e}")))
}

/// Read a file into a string with a friendly error.
pub fn read_file(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| ZkVaultError::CommandFailed(format!("cannot read {}: {e}", path.display())))
}
