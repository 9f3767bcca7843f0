pub mod cli;
pub mod config;
pub mod crypto;
mod encoding;
pub mod errors;
pub mod exchange;
pub mod keystore;
pub mod transport;
pub mod vault;
