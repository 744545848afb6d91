//! Transport listeners.
//!
//! Three kinds of input reach the reactor:
//!
//! - [`StreamListener`] / [`ClientStream`] - connection-oriented suppliers
//!   sending `ADD` lines (TCP or Unix stream)
//! - [`DatagramEndpoint`] - connectionless `DELIVER` requests, each answered
//!   with exactly one reply datagram (UDP or Unix datagram)
//! - [`Console`] - operator lines (`GEN`, `EXIT`/`quit`)
//!
//! Inet and local bindings are mutually exclusive and chosen once at
//! startup through [`TransportBinding`]. Every type here exposes
//! non-consuming readiness polls plus non-blocking `try_*` operations so
//! the reactor can wait on all of them at a single point.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Bind failures surface as `TransportError`

mod console;
mod datagram;
mod stream;

pub use console::Console;
pub use datagram::{DatagramEndpoint, Peer};
pub use stream::{ClientStream, StreamListener};

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Where the stream and datagram endpoints are bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportBinding {
    /// TCP stream port plus UDP datagram port on one host address.
    Inet {
        host: IpAddr,
        stream_port: u16,
        datagram_port: u16,
    },
    /// Unix stream socket plus Unix datagram socket.
    Local {
        stream_path: PathBuf,
        datagram_path: PathBuf,
    },
}

impl fmt::Display for TransportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet {
                host,
                stream_port,
                datagram_port,
            } => write!(f, "inet {host} (tcp {stream_port}, udp {datagram_port})"),
            Self::Local {
                stream_path,
                datagram_path,
            } => write!(
                f,
                "local (stream {}, datagram {})",
                stream_path.display(),
                datagram_path.display()
            ),
        }
    }
}

impl TransportBinding {
    /// Binds both endpoints.
    ///
    /// Must be called from within a tokio runtime. A failure on the
    /// second endpoint drops the first, closing it and unlinking its
    /// socket file.
    pub fn bind(&self) -> Result<Endpoints, TransportError> {
        let endpoints = match self {
            Self::Inet {
                host,
                stream_port,
                datagram_port,
            } => Endpoints {
                stream: StreamListener::bind_tcp(SocketAddr::new(*host, *stream_port))?,
                datagram: DatagramEndpoint::bind_udp(SocketAddr::new(*host, *datagram_port))?,
            },
            Self::Local {
                stream_path,
                datagram_path,
            } => Endpoints {
                stream: StreamListener::bind_unix(stream_path)?,
                datagram: DatagramEndpoint::bind_unix(datagram_path)?,
            },
        };

        info!(
            stream = %endpoints.stream.describe(),
            datagram = %endpoints.datagram.describe(),
            "Endpoints bound"
        );

        Ok(endpoints)
    }
}

/// The two bound server endpoints handed to the reactor.
pub struct Endpoints {
    pub stream: StreamListener,
    pub datagram: DatagramEndpoint,
}

/// Ownership of a Unix socket path.
///
/// Created before binding (removing any stale file left by a previous
/// run) and unlinks the path when dropped.
#[derive(Debug)]
pub struct SocketFile {
    path: PathBuf,
}

impl SocketFile {
    /// Clears `path` for binding and creates its parent directory.
    pub fn prepare(path: &Path) -> Result<Self, TransportError> {
        let setup_err = |e: std::io::Error| TransportError::SocketSetup {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        if path.exists() {
            std::fs::remove_file(path).map_err(setup_err)?;
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(setup_err)?;
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(
                    socket = %self.path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }
    }
}

/// Errors that can occur while setting up endpoints.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {kind} endpoint at {address}: {error}")]
    Bind {
        kind: &'static str,
        address: String,
        error: String,
    },

    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },
}
