//! `zkvault generate-password`: print or copy a random password.

use crate::cli::{copy_to_clipboard, output, Cli};
use crate::crypto::{generate_password, PasswordOptions};
use crate::errors::Result;

/// Execute the `generate-password` command.
pub fn execute(cli: &Cli, length: Option<usize>, no_symbols: bool, no_ambiguous: bool, copy: bool) -> Result<()> {
    let length = match length {
        Some(n) => n,
        None => cli.settings()?.password_length,
    };

    let options = PasswordOptions {
        symbols: !no_symbols,
        exclude_ambiguous: no_ambiguous,
        ..PasswordOptions::default()
    };
    let password = zeroize::Zeroizing::new(generate_password(length, &options)?);

    if copy {
        copy_to_clipboard(&password)?;
        output::success(&format!("Copied a {length}-character password to the clipboard"));
    } else {
        println!("{}", password.as_str());
    }
    Ok(())
}
