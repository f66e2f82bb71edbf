//! Burrow public endpoint
//!
//! Runs on the reachable host. Accepts one tunnel connection from the
//! private peer, verifies the shared secret, and serves external user
//! connections over multiplexed streams until the session dies, then
//! rebuilds the whole stack after a fixed backoff.

use anyhow::Result;
use burrow::config::PublicConfig;
use burrow::tunnel::{self, RETRY_DELAY};
use clap::Parser;
use tracing::{info, warn};

/// Burrow public endpoint - reachable half of the reverse tunnel
#[derive(Parser, Debug)]
#[command(name = "burrow-public")]
#[command(about = "Burrow public endpoint - exposes tunneled services to users")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "public_config.json")]
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

    info!("Burrow public endpoint v{}", burrow::VERSION);

    tokio::select! {
        res = supervise(&args.config) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    }
}

/// Build, run, and tear down one full stack per iteration. Configuration
/// problems end the process; everything else folds into the next iteration.
async fn supervise(config_path: &str) -> Result<()> {
    loop {
        match iteration(config_path).await {
            Ok(()) => info!("tunnel session ended"),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("iteration failed: {}", e),
        }

        info!("retrying in {} seconds", RETRY_DELAY.as_secs());
        tokio::time::sleep(RETRY_DELAY).await;
    }
}

async fn iteration(config_path: &str) -> burrow::Result<()> {
    let cfg = PublicConfig::load(config_path)?;
    tunnel::public::serve_once(&cfg).await
}
