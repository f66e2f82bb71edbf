//! Public endpoint: the reachable half of the reverse tunnel
//!
//! One iteration accepts a single tunnel connection, authenticates it, lays
//! a multiplex session over it, and then fans every accepted user connection
//! into a freshly opened stream. The iteration ends the moment the session
//! stops being able to open streams; the supervisor in the binary rebuilds
//! everything after the backoff.

use crate::config::PublicConfig;
use crate::crypto;
use crate::relay;
use crate::tunnel::{Shutdown, StreamBudget, StreamPermit, TunnelError};
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_yamux::Control;
use tokio_yamux::session::Session;
use tracing::{debug, info, warn};

/// Run one public-endpoint iteration: wait for the tunnel peer, verify its
/// token, then serve user connections until the session dies.
///
/// The order matters: the handshake completes strictly before the session
/// exists, and user listeners bind strictly after it. A peer that fails the
/// handshake never causes a user port to open.
pub async fn serve_once(cfg: &PublicConfig) -> crate::Result<()> {
    let private_key = crypto::load_private_key(&cfg.private_key_path)?;

    let tunnel_listener = TcpListener::bind(&cfg.tunnel_listen_addr)
        .await
        .map_err(TunnelError::Io)?;
    info!("waiting for tunnel peer on {}", cfg.tunnel_listen_addr);

    let (mut tunnel, peer) = tunnel_listener.accept().await.map_err(TunnelError::Io)?;
    // Only one tunnel peer at a time; close the listener immediately.
    drop(tunnel_listener);
    tunnel.set_nodelay(true).ok();

    crypto::verify_token(&mut tunnel, &private_key, &cfg.secret_token).await?;
    info!("tunnel peer {} authenticated", peer);

    if cfg.use_mux {
        serve_mux(cfg, tunnel).await
    } else {
        serve_splice(cfg, tunnel).await
    }
}

/// Multiplexed mode: one stream per user connection.
async fn serve_mux(cfg: &PublicConfig, tunnel: TcpStream) -> crate::Result<()> {
    let mut session = Session::new_server(tunnel, cfg.yamux.session_config());
    let control = session.control();
    let shutdown = Shutdown::new();

    // Drive session I/O until it fails. The public side opens streams and
    // never expects inbound ones; any that show up are dropped.
    let driver_shutdown = shutdown.clone();
    let driver = tokio::spawn(async move {
        let mut stop = driver_shutdown.clone();
        loop {
            tokio::select! {
                _ = stop.triggered() => break,
                inbound = session.next() => match inbound {
                    Some(Ok(stream)) => {
                        warn!("dropping unexpected inbound stream from tunnel peer");
                        drop(stream);
                    }
                    Some(Err(e)) => {
                        warn!("multiplex session failed: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }
        driver_shutdown.trigger();
    });

    let budget = StreamBudget::new(cfg.yamux.max_concurrent_connections);
    let mut acceptors = Vec::new();
    for addr in &cfg.user_listen_addr {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                info!("listening for users on {}", addr);
                acceptors.push(tokio::spawn(accept_users(
                    listener,
                    control.clone(),
                    budget.clone(),
                    shutdown.clone(),
                )));
            }
            Err(e) => warn!("failed to bind user listener {}: {}", addr, e),
        }
    }

    if acceptors.is_empty() {
        shutdown.trigger();
        driver.abort();
        return Err(TunnelError::NoListeners.into());
    }

    // The iteration runs until the first stream-open failure or session
    // death flips the shared signal.
    let mut stop = shutdown.clone();
    stop.triggered().await;

    for acceptor in acceptors {
        let _ = acceptor.await;
    }
    driver.abort();

    Err(TunnelError::SessionClosed.into())
}

/// One acceptor per user listener, all gated by the same shutdown signal.
async fn accept_users(
    listener: TcpListener,
    control: Control,
    budget: StreamBudget,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.clone();
    loop {
        tokio::select! {
            _ = stop.triggered() => break,
            accepted = listener.accept() => match accepted {
                Ok((user, peer)) => {
                    let Some(permit) = budget.try_claim() else {
                        // Dropping the connection here closes it before any
                        // stream is opened.
                        info!("stream cap reached, refusing user connection from {}", peer);
                        continue;
                    };
                    debug!("accepted user connection from {}", peer);
                    user.set_nodelay(true).ok();
                    tokio::spawn(pipe_user(user, control.clone(), permit, shutdown.clone()));
                }
                Err(e) => {
                    if shutdown.is_triggered() {
                        break;
                    }
                    warn!("failed to accept user connection: {}", e);
                }
            },
        }
    }
    // The listener drops here; connections still queued in the OS backlog
    // are reset.
}

/// Pair one user connection with one freshly opened stream.
async fn pipe_user(
    user: TcpStream,
    mut control: Control,
    _permit: StreamPermit,
    shutdown: Shutdown,
) {
    let stream = match control.open_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            // The session is gone; tell every acceptor exactly once and let
            // the user connection drop.
            warn!("failed to open stream: {}", e);
            shutdown.trigger();
            return;
        }
    };

    relay::link(user, stream).await;
    // _permit drops here, freeing the stream slot.
}

/// Degenerate no-mux mode: the tunnel transport carries exactly one user
/// session. Further user connections queue in the OS accept backlog until
/// this session ends and the supervisor builds a fresh tunnel.
async fn serve_splice(cfg: &PublicConfig, tunnel: TcpStream) -> crate::Result<()> {
    let addr = cfg.user_listen_addr.first().ok_or(TunnelError::NoListeners)?;
    let listener = TcpListener::bind(addr).await.map_err(TunnelError::Io)?;
    info!("listening for a single user session on {}", addr);

    let (user, peer) = listener.accept().await.map_err(TunnelError::Io)?;
    user.set_nodelay(true).ok();
    info!("splicing user {} onto the tunnel", peer);

    relay::link(tunnel, user).await;
    Ok(())
    // The listener drops only now, after the splice has ended.
}
