//! simplr - task list CLI
//!
//! Saves every task change, then keeps reminders, the search index, and the
//! app badge in step with it.

use clap::Parser;
use simplr::cli::Cli;
use simplr::output::{emit_error, infer_command_name_from_args};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs go to stderr and stay off unless RUST_LOG selects something.
/// A malformed or oversized filter is ignored rather than fatal.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty() && raw.len() <= 4096)
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    init_tracing();

    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    // Events on stdout take over the stream, so the error envelope stays human.
    let json = cli.json && cli.events.as_deref().map(str::trim) != Some("-");
    if let Err(err) = cli.run() {
        let _ = emit_error(&command, &err, json);
        std::process::exit(err.exit_code());
    }
}
