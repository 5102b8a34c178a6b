// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tether - a realtime chat transport client.
//!
//! This is the binary entry point: it loads configuration, initialises
//! tracing and dispatches to the subcommands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod config_cmd;
mod connect;
mod history;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tether_config::TetherConfig;

/// Tether - a realtime chat transport client.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Open a session, print events and send each stdin line as a message.
    Connect(connect::ConnectArgs),
    /// Fetch and print a conversation's history.
    History(history::HistoryArgs),
    /// Inspect the effective configuration.
    Config {
        #[command(subcommand)]
        action: config_cmd::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tether_config::load_and_validate_path(path),
        None => tether_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            eprint!("{}", tether_config::render_errors(&errors));
            std::process::exit(1);
        }
    };

    init_tracing(&config.session.log_level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: TetherConfig) -> Result<(), tether_core::TetherError> {
    match command {
        Some(Commands::Connect(args)) => connect::run_connect(config, args).await,
        Some(Commands::History(args)) => history::run_history(&config, args).await,
        Some(Commands::Config { action }) => config_cmd::run_config(&config, action),
        None => {
            println!("tether: use --help for available commands");
            Ok(())
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence when set. Logs go to stderr so stdout carries
/// only command output.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tether={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
