//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::exchange::HybridPublicKeys;
use crate::vault::ExportRecord;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print exported items (Type, Name, Username, URL, Folder, Fav).
///
/// Passwords and notes are never printed; the last column only says
/// whether a password is present.
pub fn print_items_table(records: &[ExportRecord]) {
    if records.is_empty() {
        info("This export contains no items.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Type", "Name", "Username", "URL", "Folder", "Fav", "Password"]);

    for r in records {
        table.add_row(vec![
            r.item_type.to_string(),
            r.name.clone(),
            r.username.clone().unwrap_or_default(),
            r.url.clone().unwrap_or_default(),
            r.folder.clone().unwrap_or_default(),
            if r.favorite { "\u{2605}".into() } else { String::new() },
            if r.password.is_some() { "set".into() } else { "-".into() },
        ]);
    }

    println!("{table}");
}

/// Print a device's public keys as short fingerprints.
pub fn print_public_keys(keys: &HybridPublicKeys) {
    let short = |bytes: &[u8]| {
        let h = hex::encode(bytes);
        if h.len() <= 16 {
            return h;
        }
        format!("{}\u{2026}{}", &h[..8], &h[h.len() - 8..])
    };

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Curve", "Public key", "Bytes"]);
    table.add_row(vec![
        "X25519".to_string(),
        short(&keys.curve25519),
        keys.curve25519.len().to_string(),
    ]);
    table.add_row(vec![
        "P-384".to_string(),
        short(&keys.p384),
        keys.p384.len().to_string(),
    ]);
    println!("{table}");
}
