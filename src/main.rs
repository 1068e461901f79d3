//! Room chat relay - Entry Point
//!
//! Parses arguments, starts the server and stops it on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roomchat::config::{self, Config};
use roomchat::Server;

#[derive(Parser, Debug)]
#[command(name = "roomchat")]
#[command(about = "Room-based TCP chat relay for terminal clients", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Directory where room history files are written
    #[arg(long, default_value = ".")]
    history_dir: PathBuf,

    /// Do not record or replay room history
    #[arg(long)]
    no_history: bool,

    /// Maximum members per room
    #[arg(long, default_value_t = config::MAX_CLIENTS)]
    max_clients: usize,

    /// Queued messages per client before it is dropped as unresponsive (at least 2)
    #[arg(long, default_value_t = config::MAILBOX_CAPACITY)]
    mailbox_capacity: usize,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            addr: format!("{}:{}", args.host, args.port),
            max_clients: args.max_clients,
            mailbox_capacity: args.mailbox_capacity.max(2),
            history_dir: (!args.no_history).then_some(args.history_dir),
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=roomchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomchat=info")),
        )
        .init();

    let config = Config::from(Args::parse());
    info!("Listening address {}", config.addr);
    let server = Arc::new(Server::new(config));

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => stopper.shutdown().await,
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    Ok(())
}
