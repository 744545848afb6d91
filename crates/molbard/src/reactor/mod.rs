//! Event-driven multiplexing reactor.
//!
//! One task owns every I/O source and the inventory. Each pass waits at a
//! single point for any source to become ready, then dispatches in a fixed
//! order:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │   wait (bounded to 1s)       │◀──────────┐
//!            └──────────────┬───────────────┘           │
//!                           │ readiness snapshot        │
//!                           ▼                           │
//!   accept ─▶ datagram ─▶ clients (high→low) ─▶ console ┘
//!      │          │              │                 │
//!      ▼          ▼              ▼                 ▼
//!   LiveTable  handlers::   Session::service  handlers::
//!              handle_datagram                handle_console_line
//! ```
//!
//! Shutdown happens on cancellation, idle expiry, console quit or a
//! failed readiness wait. Live connections are closed first, then the
//! endpoints.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-client failures remove that client; the loop keeps running

mod context;
mod session;
mod table;
mod timer;

pub use context::{BarContext, ShutdownReason};
pub use session::{Session, READ_CHUNK};
pub use table::{Disposition, LiveTable};
pub use timer::IdleTimer;

use std::fmt;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;

use molbar_core::AtomCounts;
use molbar_protocol::MAX_LINE_LEN;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::handlers;
use crate::store::{open_inventory, Inventory, StoreError};
use crate::transport::{
    ClientStream, Console, DatagramEndpoint, Endpoints, StreamListener, TransportError,
};

/// Upper bound on one readiness wait.
pub const WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Where the reactor is in its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Idle,
    Waiting,
    Dispatching,
    ShuttingDown,
}

impl fmt::Display for ReactorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Dispatching => "dispatching",
            Self::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}

/// Tunables that do not depend on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactorOptions {
    /// Maximum simultaneously registered stream clients.
    pub max_clients: usize,
    /// Idle period after which the reactor stops; `None` disables it.
    pub idle_timeout: Option<Duration>,
}

/// Outcome of [`Reactor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    /// Inventory at the moment the loop stopped.
    pub inventory: AtomCounts,
    /// Stream clients still registered at shutdown.
    pub connections_closed: usize,
}

/// Everything ready in one pass.
#[derive(Default)]
struct Readiness {
    accepted: Option<io::Result<ClientStream>>,
    datagram: Option<io::Result<()>>,
    clients: Vec<usize>,
    /// `Some(None)` means the console reached EOF.
    console: Option<Option<String>>,
}

impl Readiness {
    fn is_empty(&self) -> bool {
        self.accepted.is_none()
            && self.datagram.is_none()
            && self.clients.is_empty()
            && self.console.is_none()
    }
}

enum WaitOutcome {
    Cancelled,
    IdleExpired,
    Tick,
    Ready(Readiness),
}

/// The molecule bar server loop.
pub struct Reactor {
    listener: StreamListener,
    datagram: DatagramEndpoint,
    console: Option<Console>,
    sessions: LiveTable<Session>,
    ctx: BarContext,
    next_connection: u64,
    state: ReactorState,
}

impl Reactor {
    pub fn new(
        endpoints: Endpoints,
        inventory: Box<dyn Inventory>,
        options: ReactorOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            listener: endpoints.stream,
            datagram: endpoints.datagram,
            console: None,
            sessions: LiveTable::with_capacity(options.max_clients),
            ctx: BarContext::new(inventory, IdleTimer::new(options.idle_timeout), cancel),
            next_connection: 0,
            state: ReactorState::Idle,
        }
    }

    /// Opens the inventory and binds the endpoints described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(
        config: &ServerConfig,
        cancel: CancellationToken,
    ) -> Result<Self, ReactorError> {
        let inventory = open_inventory(config.save_file.as_deref(), config.initial)?;
        let endpoints = config.binding.bind()?;
        Ok(Self::new(
            endpoints,
            inventory,
            ReactorOptions {
                max_clients: config.max_clients,
                idle_timeout: config.idle_timeout,
            },
            cancel,
        ))
    }

    /// Attaches an operator console.
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = Some(console);
        self
    }

    pub fn stream_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn datagram_addr(&self) -> Option<SocketAddr> {
        self.datagram.local_addr()
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    /// Follows every applied inventory change.
    pub fn subscribe_inventory(&self) -> watch::Receiver<AtomCounts> {
        self.ctx.subscribe()
    }

    /// Runs until shutdown, then closes every source.
    pub async fn run(mut self) -> ShutdownReport {
        info!(
            stream = %self.listener.describe(),
            datagram = %self.datagram.describe(),
            max_clients = self.sessions.capacity(),
            idle_timeout_secs = self.ctx.idle().timeout().map(|t| t.as_secs()),
            console = self.console.is_some(),
            "Reactor running"
        );

        let cancel = self.ctx.cancel_token().clone();
        let reason = loop {
            self.set_state(ReactorState::Waiting);
            let idle = self.ctx.idle().expiry();

            let outcome = tokio::select! {
                biased;

                _ = cancel.cancelled() => WaitOutcome::Cancelled,

                _ = idle => WaitOutcome::IdleExpired,

                ready = time::timeout(WAIT_INTERVAL, poll_fn(|cx| self.poll_ready(cx))) => {
                    match ready {
                        Ok(readiness) => WaitOutcome::Ready(readiness),
                        Err(_) => WaitOutcome::Tick,
                    }
                }
            };

            match outcome {
                WaitOutcome::Cancelled => {
                    break self
                        .ctx
                        .take_shutdown_reason()
                        .unwrap_or(ShutdownReason::Requested);
                }
                WaitOutcome::IdleExpired => {
                    info!("Idle timeout reached");
                    break ShutdownReason::IdleTimeout;
                }
                WaitOutcome::Tick => {
                    trace!("No activity");
                }
                WaitOutcome::Ready(readiness) => {
                    self.set_state(ReactorState::Dispatching);
                    if let Err(reason) = self.dispatch(readiness) {
                        break reason;
                    }
                }
            }
            self.set_state(ReactorState::Idle);
        };

        self.shutdown(reason)
    }

    fn set_state(&mut self, state: ReactorState) {
        if self.state != state {
            trace!(from = %self.state, to = %state, "Reactor state");
            self.state = state;
        }
    }

    /// Collects readiness from every source without consuming data,
    /// except an accepted connection or a console line, which are kept in
    /// the snapshot.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Readiness> {
        let mut ready = Readiness::default();

        if let Poll::Ready(result) = self.listener.poll_accept(cx) {
            ready.accepted = Some(result);
        }

        if let Poll::Ready(result) = self.datagram.poll_recv_ready(cx) {
            ready.datagram = Some(result);
        }

        for (index, session) in self.sessions.iter().enumerate() {
            // Errors surface on the following read.
            if session.poll_read_ready(cx).is_ready() {
                ready.clients.push(index);
            }
        }

        if let Some(console) = self.console.as_mut() {
            if let Poll::Ready(line) = console.poll_line(cx) {
                ready.console = Some(line);
            }
        }

        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(ready)
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn dispatch(&mut self, ready: Readiness) -> Result<(), ShutdownReason> {
        if let Some(accepted) = ready.accepted {
            self.ctx.touch();
            self.admit(accepted);
        }

        if let Some(result) = ready.datagram {
            if let Err(e) = result {
                error!(error = %e, "Datagram readiness failed");
                return Err(ShutdownReason::WaitFailed {
                    error: e.to_string(),
                });
            }
            self.ctx.touch();
            self.serve_datagram();
        }

        if !ready.clients.is_empty() {
            self.ctx.touch();
            let ctx = &mut self.ctx;
            let removed = self
                .sessions
                .dispatch(ready.clients, |session| session.service(ctx));
            if removed > 0 {
                debug!(removed, active = self.sessions.len(), "Clients removed");
            }
        }

        if let Some(line) = ready.console {
            self.ctx.touch();
            match line {
                Some(line) => handlers::handle_console_line(&mut self.ctx, &line),
                None => {
                    info!("Console closed");
                    self.console = None;
                }
            }
        }

        Ok(())
    }

    fn admit(&mut self, accepted: io::Result<ClientStream>) {
        let stream = match accepted {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                return;
            }
        };

        let id = self.next_connection;
        self.next_connection = self.next_connection.wrapping_add(1);
        let session = Session::new(id, stream);
        let peer = session.peer();

        match self.sessions.insert(session) {
            Ok(_) => info!(
                connection = id,
                peer = %peer,
                active = self.sessions.len(),
                "Client connected"
            ),
            Err(rejected) => {
                warn!(
                    connection = id,
                    peer = %peer,
                    max = self.sessions.capacity(),
                    "Connection limit reached, closing"
                );
                drop(rejected);
            }
        }
    }

    fn serve_datagram(&mut self) {
        // One spare byte so an oversized datagram is seen as such.
        let mut buf = [0u8; MAX_LINE_LEN + 1];
        let (len, peer) = match self.datagram.try_recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!(error = %e, "Failed to receive datagram");
                return;
            }
        };

        let payload = buf.get(..len).unwrap_or_default();
        let reply = handlers::handle_datagram(&mut self.ctx, payload);
        debug!(peer = %peer, reply = %reply, "Replying");

        if let Err(e) = self.datagram.try_send_to(reply.to_string().as_bytes(), &peer) {
            warn!(peer = %peer, error = %e, "Failed to send reply");
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    fn shutdown(mut self, reason: ShutdownReason) -> ShutdownReport {
        self.set_state(ReactorState::ShuttingDown);
        info!(reason = %reason, active = self.sessions.len(), "Reactor shutting down");

        let Reactor {
            listener,
            datagram,
            console,
            mut sessions,
            ctx,
            ..
        } = self;

        let connections_closed = sessions.clear();
        drop(console);
        drop(listener);
        drop(datagram);

        let inventory = ctx.inventory().snapshot();
        info!(
            connections_closed,
            inventory = %inventory,
            "Reactor stopped"
        );

        ShutdownReport {
            reason,
            inventory,
            connections_closed,
        }
    }
}

/// Errors that prevent the reactor from starting.
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryInventory;
    use crate::transport::TransportBinding;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    fn local_reactor(dir: &tempfile::TempDir, options: ReactorOptions) -> Reactor {
        let endpoints = TransportBinding::Local {
            stream_path: dir.path().join("s.sock"),
            datagram_path: dir.path().join("d.sock"),
        }
        .bind()
        .unwrap();
        Reactor::new(
            endpoints,
            Box::new(MemoryInventory::new(AtomCounts::ZERO)),
            options,
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ReactorState::ShuttingDown.to_string(), "shutting-down");
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let endpoints = TransportBinding::Local {
            stream_path: dir.path().join("s.sock"),
            datagram_path: dir.path().join("d.sock"),
        }
        .bind()
        .unwrap();
        let reactor = Reactor::new(
            endpoints,
            Box::new(MemoryInventory::new(AtomCounts::new(1, 1, 1))),
            ReactorOptions {
                max_clients: 2,
                idle_timeout: None,
            },
            cancel.clone(),
        );
        assert_eq!(reactor.state(), ReactorState::Idle);

        cancel.cancel();
        let report = reactor.run().await;
        assert_eq!(report.reason, ShutdownReason::Requested);
        assert_eq!(report.inventory, AtomCounts::new(1, 1, 1));
        assert!(!dir.path().join("s.sock").exists());
    }

    #[tokio::test]
    async fn test_idle_timeout_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let reactor = local_reactor(
            &dir,
            ReactorOptions {
                max_clients: 2,
                idle_timeout: Some(Duration::from_millis(200)),
            },
        );
        let report = time::timeout(Duration::from_secs(5), reactor.run())
            .await
            .unwrap();
        assert_eq!(report.reason, ShutdownReason::IdleTimeout);
        assert!(!report.reason.is_failure());
    }

    #[tokio::test]
    async fn test_stream_adds_reach_watchers() {
        let dir = tempfile::tempdir().unwrap();
        let reactor = local_reactor(
            &dir,
            ReactorOptions {
                max_clients: 2,
                idle_timeout: Some(Duration::from_secs(5)),
            },
        );
        let mut watch = reactor.subscribe_inventory();
        let path = dir.path().join("s.sock");
        let handle = tokio::spawn(reactor.run());

        let mut client = UnixStream::connect(&path).await.unwrap();
        client.write_all(b"ADD HYDROGEN 7\n").await.unwrap();

        time::timeout(Duration::from_secs(5), watch.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*watch.borrow(), AtomCounts::new(0, 7, 0));

        client.write_all(b"EXIT\n").await.unwrap();
        drop(client);
        handle.abort();
    }

    #[tokio::test]
    async fn test_console_quit_stops() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let reactor = local_reactor(
            &dir,
            ReactorOptions {
                max_clients: 1,
                idle_timeout: None,
            },
        )
        .with_console(Console::from_channel(rx));

        tx.send("quit".to_string()).await.unwrap();
        let report = time::timeout(Duration::from_secs(5), reactor.run())
            .await
            .unwrap();
        assert_eq!(report.reason, ShutdownReason::ConsoleQuit);
    }
}
