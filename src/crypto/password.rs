//! Local random password generator.  Independent of any vault session.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::errors::{Result, ZkVaultError};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()-_=+[]{};:,.<>?/~";
const AMBIGUOUS: &str = "Il1O0o|`'\"";

pub const MIN_LENGTH: usize = 4;
pub const MAX_LENGTH: usize = 256;

/// Character classes to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordOptions {
    pub lowercase: bool,
    pub uppercase: bool,
    pub digits: bool,
    pub symbols: bool,
    pub exclude_ambiguous: bool,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            uppercase: true,
            digits: true,
            symbols: true,
            exclude_ambiguous: false,
        }
    }
}

/// Generate a password of `length` characters.
///
/// Every enabled class contributes at least one character; the rest is
/// drawn uniformly from the union and the result is shuffled.
pub fn generate_password(length: usize, options: &PasswordOptions) -> Result<String> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        return Err(ZkVaultError::InvalidInput(format!(
            "password length must be between {MIN_LENGTH} and {MAX_LENGTH} (got {length})"
        )));
    }

    let classes: Vec<Vec<char>> = [
        (options.lowercase, LOWERCASE),
        (options.uppercase, UPPERCASE),
        (options.digits, DIGITS),
        (options.symbols, SYMBOLS),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, set)| {
        set.chars()
            .filter(|c| !(options.exclude_ambiguous && AMBIGUOUS.contains(*c)))
            .collect()
    })
    .collect();

    if classes.is_empty() {
        return Err(ZkVaultError::InvalidInput(
            "at least one character class must be enabled".into(),
        ));
    }

    let pool: Vec<char> = classes.iter().flatten().copied().collect();
    let mut rng = rand::rng();

    let mut out: Vec<char> = classes
        .iter()
        .map(|class| class[rng.random_range(0..class.len())])
        .collect();
    while out.len() < length {
        out.push(pool[rng.random_range(0..pool.len())]);
    }
    out.shuffle(&mut rng);

    Ok(out.into_iter().collect())
}
