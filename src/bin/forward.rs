//! Burrow plain port forwarder
//!
//! The simplest member of the family: accepts TCP connections on one
//! address and relays each to another, with no tunnel in between.

use anyhow::Result;
use burrow::config::ForwardConfig;
use burrow::forward;
use clap::Parser;
use tracing::info;

/// Burrow forward - trivial TCP port forwarder
#[derive(Parser, Debug)]
#[command(name = "burrow-forward")]
#[command(about = "Burrow forward - plain TCP port forwarding")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("Burrow forward v{}", burrow::VERSION);
    let cfg = ForwardConfig::load(&args.config)?;

    tokio::select! {
        res = forward::run_forwarder(&cfg) => res.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    }
}
