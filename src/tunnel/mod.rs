//! The reverse multiplexed tunnel
//!
//! Two peers cooperate: the public endpoint ([`public`]) runs on a reachable
//! host, the private endpoint ([`private`]) runs behind NAT and dials out.
//! One TCP connection between them carries an authenticated multiplex
//! session; every external user session becomes one stream on it.
//!
//! Both endpoints are built as a single fallible iteration. The supervisor
//! in each daemon binary runs iterations in a loop with a fixed backoff, so
//! any fatal condition (peer loss, handshake rejection, session failure)
//! tears the whole stack down and rebuilds it from scratch.

pub mod private;
pub mod public;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Backoff between supervisor iterations, on both sides.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

/// How long the private side waits between cap checks before accepting the
/// next stream.
pub const ACCEPT_PACING: Duration = Duration::from_millis(100);

/// Tunnel errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("multiplex session error: {0}")]
    Mux(String),

    #[error("multiplex session closed")]
    SessionClosed,

    #[error("no user listener could be bound")]
    NoListeners,
}

/// A close-once termination broadcast shared by every task of one iteration.
///
/// Triggering is idempotent; observers can poll [`is_triggered`] without
/// blocking or await [`triggered`]. Modeled as a watch channel that only
/// ever moves from `false` to `true`.
///
/// [`is_triggered`]: Shutdown::is_triggered
/// [`triggered`]: Shutdown::triggered
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Signal every holder. Safe to call any number of times.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has been triggered.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Caps the number of live streams on one session.
///
/// A cap of zero means unlimited. The public side refuses user connections
/// outright when the cap is reached; the private side paces its accept loop
/// instead, so the cap there is best-effort backpressure rather than a hard
/// limit.
#[derive(Clone)]
pub struct StreamBudget {
    slots: Option<Arc<Semaphore>>,
}

/// One claimed stream slot; the slot frees when the permit drops.
pub struct StreamPermit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl StreamBudget {
    pub fn new(cap: u32) -> Self {
        let slots = (cap > 0).then(|| Arc::new(Semaphore::new(cap as usize)));
        Self { slots }
    }

    /// Claim a slot without waiting. `None` when the session is at its cap.
    pub fn try_claim(&self) -> Option<StreamPermit> {
        match &self.slots {
            None => Some(StreamPermit { _slot: None }),
            Some(slots) => slots
                .clone()
                .try_acquire_owned()
                .ok()
                .map(|permit| StreamPermit { _slot: Some(permit) }),
        }
    }

    /// Claim a slot, polling every [`ACCEPT_PACING`] until one frees up.
    pub async fn claim_paced(&self) -> StreamPermit {
        loop {
            if let Some(permit) = self.try_claim() {
                return permit;
            }
            tokio::time::sleep(ACCEPT_PACING).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_broadcast() {
        let shutdown = Shutdown::new();
        let mut observer = shutdown.clone();
        assert!(!observer.is_triggered());

        let waiter = tokio::spawn(async move {
            observer.triggered().await;
        });

        shutdown.trigger();
        shutdown.trigger(); // idempotent
        waiter.await.unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_budget_enforces_cap() {
        let budget = StreamBudget::new(2);

        let first = budget.try_claim().unwrap();
        let _second = budget.try_claim().unwrap();
        assert!(budget.try_claim().is_none());

        drop(first);
        assert!(budget.try_claim().is_some());
    }

    #[tokio::test]
    async fn test_zero_cap_is_unlimited() {
        let budget = StreamBudget::new(0);
        let claims: Vec<_> = (0..64).map(|_| budget.try_claim()).collect();
        assert!(claims.iter().all(|claim| claim.is_some()));
    }

    #[tokio::test]
    async fn test_claim_paced_waits_for_release() {
        let budget = StreamBudget::new(1);
        let held = budget.try_claim().unwrap();

        let contender = {
            let budget = budget.clone();
            tokio::spawn(async move { budget.claim_paced().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        let _permit = tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }
}
