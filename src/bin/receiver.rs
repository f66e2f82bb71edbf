//! Burrow receiver forwarder
//!
//! Terminates TLS connections from an entry daemon and relays each one in
//! plaintext to the target service.

use anyhow::Result;
use burrow::config::ReceiverConfig;
use burrow::forward;
use clap::Parser;
use tracing::info;

/// Burrow receiver - TLS-terminating side of the forwarder pair
#[derive(Parser, Debug)]
#[command(name = "burrow-receiver")]
#[command(about = "Burrow receiver - terminates TLS and delivers to the target service")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "receiver_config.json")]
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

    info!("Burrow receiver v{}", burrow::VERSION);
    let cfg = ReceiverConfig::load(&args.config)?;

    tokio::select! {
        res = forward::run_receiver(&cfg) => res.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    }
}
