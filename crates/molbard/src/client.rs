//! Client helpers for talking to a running server.
//!
//! - [`StreamSupplier`] sends `ADD` lines over a stream connection
//! - [`DatagramRequester`] sends `DELIVER` requests and waits for the reply

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use molbar_core::Atom;
use molbar_protocol::{Command, Reply, MAX_LINE_LEN};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket, UnixDatagram, UnixStream};
use tracing::debug;

use crate::transport::SocketFile;

/// How long a requester waits for a reply by default.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Address of a server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddr {
    Inet(SocketAddr),
    Local(PathBuf),
}

// ============================================================================
// Stream supplier
// ============================================================================

enum SupplierStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// Connection that supplies atoms to the server.
pub struct StreamSupplier {
    stream: SupplierStream,
}

impl StreamSupplier {
    pub async fn connect(addr: &ServerAddr) -> Result<Self, ClientError> {
        let stream = match addr {
            ServerAddr::Inet(addr) => TcpStream::connect(addr)
                .await
                .map(SupplierStream::Tcp)
                .map_err(|e| ClientError::connect(addr, e))?,
            ServerAddr::Local(path) => UnixStream::connect(path)
                .await
                .map(SupplierStream::Unix)
                .map_err(|e| ClientError::connect(path.display(), e))?,
        };
        Ok(Self { stream })
    }

    /// Sends `ADD <atom> <quantity>`.
    pub async fn add(&mut self, atom: Atom, quantity: u64) -> Result<(), ClientError> {
        self.send_line(&Command::Add { atom, quantity }.to_string())
            .await
    }

    /// Sends one raw line; a newline is appended.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        let result = match &mut self.stream {
            SupplierStream::Tcp(stream) => stream.write_all(&data).await,
            SupplierStream::Unix(stream) => stream.write_all(&data).await,
        };
        result.map_err(|e| ClientError::Io(e.to_string()))
    }

    /// Sends `EXIT` and closes the connection.
    pub async fn exit(mut self) -> Result<(), ClientError> {
        self.send_line(&Command::Exit.to_string()).await?;
        let result = match &mut self.stream {
            SupplierStream::Tcp(stream) => stream.shutdown().await,
            SupplierStream::Unix(stream) => stream.shutdown().await,
        };
        result.map_err(|e| ClientError::Io(e.to_string()))
    }
}

// ============================================================================
// Datagram requester
// ============================================================================

enum RequesterSocket {
    Udp {
        socket: UdpSocket,
        server: SocketAddr,
    },
    Unix {
        socket: UnixDatagram,
        server: PathBuf,
        _reply_file: SocketFile,
    },
}

/// Datagram client requesting molecules.
pub struct DatagramRequester {
    socket: RequesterSocket,
    timeout: Duration,
}

impl DatagramRequester {
    /// Binds an ephemeral UDP port in the server's address family.
    pub async fn udp(server: SocketAddr) -> Result<Self, ClientError> {
        let local = match server {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| ClientError::connect(local, e))?;
        Ok(Self {
            socket: RequesterSocket::Udp { socket, server },
            timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// Binds `reply_path` so the server can answer; the path is removed
    /// when the requester is dropped.
    pub fn unix(server: &Path, reply_path: &Path) -> Result<Self, ClientError> {
        let reply_file =
            SocketFile::prepare(reply_path).map_err(|e| ClientError::Io(e.to_string()))?;
        let socket =
            UnixDatagram::bind(reply_path).map_err(|e| ClientError::connect(reply_path.display(), e))?;
        Ok(Self {
            socket: RequesterSocket::Unix {
                socket,
                server: server.to_path_buf(),
                _reply_file: reply_file,
            },
            timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// Connects to either kind of server address. Unix requesters bind
    /// their reply socket at `reply_path`.
    pub async fn connect(addr: &ServerAddr, reply_path: &Path) -> Result<Self, ClientError> {
        match addr {
            ServerAddr::Inet(addr) => Self::udp(*addr).await,
            ServerAddr::Local(path) => Self::unix(path, reply_path),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests `quantity` molecules.
    pub async fn deliver(&self, molecule: &str, quantity: u64) -> Result<Reply, ClientError> {
        let command = Command::Deliver {
            molecule: molecule.to_string(),
            quantity,
        };
        self.request(&command.to_string()).await
    }

    /// Sends one raw datagram and waits for the reply.
    pub async fn request(&self, line: &str) -> Result<Reply, ClientError> {
        let mut buf = [0u8; MAX_LINE_LEN];
        let len = tokio::time::timeout(self.timeout, self.exchange(line, &mut buf))
            .await
            .map_err(|_| ClientError::Timeout {
                after: self.timeout,
            })?
            .map_err(|e| ClientError::Io(e.to_string()))?;

        let text = String::from_utf8_lossy(buf.get(..len).unwrap_or_default());
        debug!(reply = %text, "Reply received");
        Ok(Reply::from_wire(&text))
    }

    async fn exchange(&self, line: &str, buf: &mut [u8]) -> std::io::Result<usize> {
        match &self.socket {
            RequesterSocket::Udp { socket, server } => {
                socket.send_to(line.as_bytes(), server).await?;
                let (len, _) = socket.recv_from(buf).await?;
                Ok(len)
            }
            RequesterSocket::Unix { socket, server, .. } => {
                socket.send_to(line.as_bytes(), server).await?;
                let (len, _) = socket.recv_from(buf).await?;
                Ok(len)
            }
        }
    }
}

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to connect to {address}: {error}")]
    Connect { address: String, error: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("No reply within {after:?}")]
    Timeout { after: Duration },
}

impl ClientError {
    fn connect(address: impl std::fmt::Display, error: std::io::Error) -> Self {
        Self::Connect {
            address: address.to_string(),
            error: error.to_string(),
        }
    }
}
