//! State shared by every handler for the lifetime of one reactor.

use std::fmt;

use molbar_core::AtomCounts;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::timer::IdleTimer;
use crate::store::Inventory;

/// Why the reactor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The cancellation token was triggered (termination signal or embedder).
    Requested,
    /// No I/O activity for the configured idle timeout.
    IdleTimeout,
    /// `EXIT`/`quit` was entered on the console.
    ConsoleQuit,
    /// Waiting for readiness failed.
    WaitFailed { error: String },
}

impl ShutdownReason {
    /// True when the process should exit with a failure status.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::WaitFailed { .. })
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("shutdown requested"),
            Self::IdleTimeout => f.write_str("idle timeout"),
            Self::ConsoleQuit => f.write_str("console quit"),
            Self::WaitFailed { error } => write!(f, "readiness wait failed: {error}"),
        }
    }
}

/// Inventory, idle timer and shutdown state, owned by the reactor and
/// lent to handlers one event at a time.
pub struct BarContext {
    inventory: Box<dyn Inventory>,
    idle: IdleTimer,
    cancel: CancellationToken,
    shutdown: Option<ShutdownReason>,
    inventory_tx: watch::Sender<AtomCounts>,
}

impl BarContext {
    pub fn new(inventory: Box<dyn Inventory>, idle: IdleTimer, cancel: CancellationToken) -> Self {
        let (inventory_tx, _) = watch::channel(inventory.snapshot());
        Self {
            inventory,
            idle,
            cancel,
            shutdown: None,
            inventory_tx,
        }
    }

    pub fn inventory(&self) -> &dyn Inventory {
        self.inventory.as_ref()
    }

    pub fn inventory_mut(&mut self) -> &mut dyn Inventory {
        self.inventory.as_mut()
    }

    pub fn idle(&self) -> &IdleTimer {
        &self.idle
    }

    /// Records I/O activity.
    pub fn touch(&mut self) {
        self.idle.rearm();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Asks the reactor to stop after the current pass.
    ///
    /// The first recorded reason wins.
    pub fn request_shutdown(&mut self, reason: ShutdownReason) {
        if self.shutdown.is_none() {
            info!(reason = %reason, "Shutdown requested");
            self.shutdown = Some(reason);
        }
        self.cancel.cancel();
    }

    pub fn take_shutdown_reason(&mut self) -> Option<ShutdownReason> {
        self.shutdown.take()
    }

    /// Logs and publishes the current inventory after a mutation.
    pub fn publish(&self) {
        let snapshot = self.inventory.snapshot();
        info!(
            carbon = snapshot.carbon,
            hydrogen = snapshot.hydrogen,
            oxygen = snapshot.oxygen,
            "Inventory"
        );
        self.inventory_tx.send_replace(snapshot);
    }

    /// Receiver following every published inventory snapshot.
    pub fn subscribe(&self) -> watch::Receiver<AtomCounts> {
        self.inventory_tx.subscribe()
    }
}
