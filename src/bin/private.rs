//! Burrow private endpoint
//!
//! Runs behind NAT. Dials the public endpoint, proves knowledge of the
//! shared secret, and fans accepted streams out to local services
//! round-robin until the session dies, then redials after a fixed backoff.

use anyhow::Result;
use burrow::config::PrivateConfig;
use burrow::tunnel::{self, RETRY_DELAY};
use clap::Parser;
use tracing::{info, warn};

/// Burrow private endpoint - NAT-side half of the reverse tunnel
#[derive(Parser, Debug)]
#[command(name = "burrow-private")]
#[command(about = "Burrow private endpoint - connects local services to the tunnel")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "private_config.json")]
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

    info!("Burrow private endpoint v{}", burrow::VERSION);

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
    let cfg = PrivateConfig::load(config_path)?;
    tunnel::private::run_once(&cfg).await
}
