mod cli;
mod execute;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use crate::cli::CLI;
use anyhow::Result;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // logs go to stderr, stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = CLI::parse();
    init_tracing(cli.verbose);
    execute::execute(cli)
}
