//! Configuration loaded from `zkvault.toml`.

pub mod settings;

pub use settings::Settings;
