//! Connection-oriented transport: TCP or Unix stream sockets.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::task::{Context, Poll};

use tokio::net::{TcpListener, TcpSocket, TcpStream, UnixListener, UnixStream};

use super::{SocketFile, TransportError};

/// Pending-connection queue length for the listening socket.
const BACKLOG: u32 = 10;

/// Listening socket for stream clients.
pub enum StreamListener {
    Tcp(TcpListener),
    Unix {
        listener: UnixListener,
        file: SocketFile,
    },
}

impl StreamListener {
    /// Binds a TCP listener with `SO_REUSEADDR`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_tcp(addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_err = |e: io::Error| TransportError::Bind {
            kind: "stream",
            address: addr.to_string(),
            error: e.to_string(),
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(BACKLOG).map_err(bind_err)?;
        Ok(Self::Tcp(listener))
    }

    /// Binds a Unix stream listener, replacing a stale socket file.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_unix(path: &Path) -> Result<Self, TransportError> {
        let file = SocketFile::prepare(path)?;
        let listener = UnixListener::bind(path).map_err(|e| TransportError::Bind {
            kind: "stream",
            address: path.display().to_string(),
            error: e.to_string(),
        })?;
        Ok(Self::Unix { listener, file })
    }

    /// Accepts at most one pending connection.
    pub fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<ClientStream>> {
        match self {
            Self::Tcp(listener) => listener
                .poll_accept(cx)
                .map_ok(|(stream, addr)| ClientStream::Tcp { stream, addr }),
            Self::Unix { listener, .. } => listener
                .poll_accept(cx)
                .map_ok(|(stream, _addr)| ClientStream::Unix(stream)),
        }
    }

    /// Bound address for TCP listeners.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            Self::Unix { .. } => None,
        }
    }

    /// Human-readable bound address for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => format!("tcp://{addr}"),
                Err(_) => "tcp://?".to_string(),
            },
            Self::Unix { file, .. } => format!("unix://{}", file.path().display()),
        }
    }
}

/// One accepted stream client.
pub enum ClientStream {
    Tcp { stream: TcpStream, addr: SocketAddr },
    Unix(UnixStream),
}

impl ClientStream {
    /// Readiness for reading; does not consume data.
    pub fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self {
            Self::Tcp { stream, .. } => stream.poll_read_ready(cx),
            Self::Unix(stream) => stream.poll_read_ready(cx),
        }
    }

    /// Non-blocking read. `Ok(0)` means the peer closed the connection.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp { stream, .. } => stream.try_read(buf),
            Self::Unix(stream) => stream.try_read(buf),
        }
    }

    /// Peer description for logs.
    pub fn peer(&self) -> String {
        match self {
            Self::Tcp { addr, .. } => addr.to_string(),
            Self::Unix(_) => "unix".to_string(),
        }
    }
}
