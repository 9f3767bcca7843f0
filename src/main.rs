use clap::Parser;
use tracing_subscriber::EnvFilter;
use zkvault::cli::{Cli, Commands};

fn main() {
    // Logs go to stderr so they never mix with printed keys or envelopes.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ZKVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::GeneratePassword {
            length,
            no_symbols,
            no_ambiguous,
            copy,
        } => zkvault::cli::commands::password::execute(&cli, length, no_symbols, no_ambiguous, copy),
        Commands::DeviceKeygen { ref out, force } => {
            zkvault::cli::commands::device::execute_keygen(out, force)
        }
        Commands::WrapKey {
            ref peer,
            ref key_hex,
            ref out,
        } => zkvault::cli::commands::device::execute_wrap(peer, key_hex.as_deref(), out.as_deref()),
        Commands::UnwrapKey {
            ref envelope,
            ref keys,
            copy,
        } => zkvault::cli::commands::device::execute_unwrap(envelope, keys, copy),
        Commands::InspectExport { ref file, ref format } => {
            zkvault::cli::commands::inspect::execute(file, format.as_deref())
        }
    };

    if let Err(e) = result {
        zkvault::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
