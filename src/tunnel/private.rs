//! Private endpoint: the NAT-side half of the reverse tunnel
//!
//! One iteration dials the public endpoint, presents the encrypted secret,
//! then accepts streams off the multiplex session and pairs each one with a
//! local service connection, chosen round-robin across the configured
//! targets. A failed local dial costs only that stream; losing the session
//! ends the iteration.

use crate::config::PrivateConfig;
use crate::crypto;
use crate::relay;
use crate::tunnel::{StreamBudget, StreamPermit, TunnelError};
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_yamux::session::Session;
use tokio_yamux::stream::StreamHandle;
use tracing::{debug, info, warn};

/// Run one private-endpoint iteration: dial the tunnel, authenticate, then
/// serve streams until the session dies.
pub async fn run_once(cfg: &PrivateConfig) -> crate::Result<()> {
    let public_key = crypto::load_public_key(&cfg.public_key_path)?;

    info!("dialing tunnel endpoint {}", cfg.tunnel_server_addr);
    let mut tunnel = TcpStream::connect(&cfg.tunnel_server_addr)
        .await
        .map_err(TunnelError::Io)?;
    tunnel.set_nodelay(true).ok();

    crypto::send_token(&mut tunnel, &public_key, &cfg.secret_token).await?;
    info!("presented secret token to tunnel endpoint");

    if cfg.use_mux {
        run_mux(cfg, tunnel).await
    } else {
        run_splice(cfg, tunnel).await
    }
}

/// Multiplexed mode: accept streams and fan them out to local targets.
async fn run_mux(cfg: &PrivateConfig, tunnel: TcpStream) -> crate::Result<()> {
    let mut session = Session::new_client(tunnel, cfg.yamux.session_config());

    // The driver pumps session I/O for every live stream; accepted streams
    // queue here so that pacing at the cap delays new accepts without
    // stalling bytes already in flight.
    let backlog = cfg.yamux.accept_backlog.max(1) as usize;
    let (stream_tx, mut stream_rx) = mpsc::channel::<StreamHandle>(backlog);
    let driver = tokio::spawn(async move {
        loop {
            match session.next().await {
                Some(Ok(stream)) => {
                    if stream_tx.send(stream).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("multiplex session failed: {}", e);
                    break;
                }
                None => break,
            }
        }
        // Dropping stream_tx wakes the accept loop with `None`.
    });

    let budget = StreamBudget::new(cfg.yamux.max_concurrent_connections);
    let mut next_target = 0usize;
    loop {
        // Claim the slot before accepting, so the count includes the stream
        // we are about to take.
        let permit = budget.claim_paced().await;
        let Some(stream) = stream_rx.recv().await else {
            break;
        };

        let target = cfg.local_listen_addr[next_target % cfg.local_listen_addr.len()].clone();
        next_target += 1;
        debug!("accepted stream, pairing with {}", target);
        tokio::spawn(pipe_stream(stream, target, permit));
    }

    driver.abort();
    Err(TunnelError::SessionClosed.into())
}

/// Pair one accepted stream with one local service connection.
async fn pipe_stream(stream: StreamHandle, target: String, _permit: StreamPermit) {
    let local = match TcpStream::connect(&target).await {
        Ok(local) => local,
        Err(e) => {
            // Dropping the stream closes it; the session and its other
            // streams are unaffected.
            warn!("failed to dial local service {}: {}", target, e);
            return;
        }
    };
    local.set_nodelay(true).ok();
    debug!("linked stream to local service {}", target);

    relay::link(stream, local).await;
    // _permit drops here, freeing the stream slot.
}

/// Degenerate no-mux mode: splice the tunnel transport onto the first local
/// target. The remaining targets are unreachable in this mode.
async fn run_splice(cfg: &PrivateConfig, tunnel: TcpStream) -> crate::Result<()> {
    let target = &cfg.local_listen_addr[0];
    let local = TcpStream::connect(target).await.map_err(TunnelError::Io)?;
    local.set_nodelay(true).ok();
    info!("splicing tunnel onto local service {}", target);

    relay::link(tunnel, local).await;
    Ok(())
}
