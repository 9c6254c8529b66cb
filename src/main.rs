mod catalog;
mod cli;
mod config;
mod connection;
mod error;
mod executor;
mod formatter;
mod interactive;
mod loader;
mod script;
mod signature;
mod store;
mod value;

use clap::Parser;
use cli::Cli;
use colored::*;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Execute the CLI
    if let Err(e) = cli.execute().await {
        eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
        std::process::exit(1);
    }
}
