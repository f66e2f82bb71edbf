//! # Burrow
//!
//! A family of TCP tunneling daemons that expose services on a private host
//! to clients on a public network. The tunnel survives NAT and firewall
//! restrictions by reversing the direction in which the long-lived control
//! connection is established: the private side dials out, the public side
//! carries the users.
//!
//! ## Daemons
//!
//! - **burrow-public** — accepts one tunnel connection from the private
//!   peer, authenticates it, and fans external user connections into
//!   multiplexed streams over that single connection
//! - **burrow-private** — dials the public peer, proves knowledge of the
//!   shared secret, and fans accepted streams out to local services
//!   round-robin
//! - **burrow-entry / burrow-receiver** — a TLS-wrapped point-to-point
//!   forwarder pair (plaintext in, TLS across, plaintext out)
//! - **burrow-forward** — a trivial TCP port forwarder
//!
//! ## Architecture
//!
//! ```text
//! users ──▶ burrow-public ◀══ tunnel (RSA token + yamux) ══ burrow-private ──▶ local services
//!           (reachable host)                                (behind NAT)
//! ```
//!
//! Everything above the socket layer shares one relay primitive: a
//! full-duplex copy that couples the lifetimes of the two endpoints it
//! joins. Both tunnel endpoints run under a supervisor that rebuilds the
//! whole stack after any fatal condition.

pub mod config;
pub mod crypto;
pub mod forward;
pub mod relay;
pub mod tunnel;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] tunnel::TunnelError),

    #[error("Forwarder error: {0}")]
    Forward(#[from] forward::ForwardError),
}

impl Error {
    /// Whether this error should terminate the process rather than fold
    /// into the supervisor's next iteration. Only configuration errors
    /// qualify; everything else is retried after the backoff.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
