//! Turncoat - session coordinator for a five-seat deduction game
//!
//! One process hosts the table with `turncoat serve`; five others take
//! their seats with `turncoat join`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod join;
mod presenter;
mod serve;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host a session and drive it to completion
    Serve {
        /// Path to a TOML config file
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Listen port, overriding the config
        #[clap(short, long)]
        port: Option<u16>,
    },
    /// Take a seat at a running session
    Join {
        /// Coordinator host
        host: String,
        /// Name to register under
        #[clap(short, long)]
        name: String,
        /// Coordinator port
        #[clap(short, long, default_value_t = turncoat_net::DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve { config, port } => serve::run(config, port).await,
        Command::Join { host, name, port } => join::run(&host, port, &name).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal");
            ExitCode::FAILURE
        }
    }
}
