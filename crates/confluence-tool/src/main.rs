//! ct - Confluence API and CLI
//!
//! Commands:
//! - config: Save a connection profile (password goes to the secrets vault)
//! - show <ID>...: Print pages (or selected fields) as YAML or JSON
//! - page-prop <ID>...: Print page properties
//! - labels <ID>...: Print page labels

mod cli;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use confluence_tool::Config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --debug
    let default_level = if cli.connection.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::new(cli.connection.into());

    match cli::run(&mut config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", cli::error_report(&e, config.debug()));
            ExitCode::FAILURE
        }
    }
}
