//! Burrow entry forwarder
//!
//! Accepts plaintext connections and relays each one TLS-encrypted to a
//! receiver daemon on another host.

use anyhow::Result;
use burrow::config::EntryConfig;
use burrow::forward;
use clap::Parser;
use tracing::info;

/// Burrow entry - plaintext-accepting side of the TLS forwarder pair
#[derive(Parser, Debug)]
#[command(name = "burrow-entry")]
#[command(about = "Burrow entry - relays plaintext connections to a TLS receiver")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "entry_config.json")]
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

    info!("Burrow entry v{}", burrow::VERSION);
    let cfg = EntryConfig::load(&args.config)?;

    tokio::select! {
        res = forward::run_entry(&cfg) => res.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    }
}
