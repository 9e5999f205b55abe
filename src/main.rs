//! Binary entry point for engram.
//!
//! Exit codes: 0 success, 1 generic error, 2 configuration error,
//! 3 storage unavailable.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output goes to stdout/stderr by design.
#![allow(clippy::print_stderr, clippy::print_stdout)]

use clap::Parser;
use engram::cli::{Cli, exit_code, load_config, run};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Best-effort .env loading; absence is fine.
    let _ = dotenvy::dotenv();

    // stdout carries the tool protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("engram=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        },
    };

    if let Err(e) = run(cli, config).await {
        eprintln!("error: {e}");
        std::process::exit(exit_code(&e));
    }
}
