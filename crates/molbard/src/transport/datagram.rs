//! Connectionless transport: UDP or Unix datagram sockets.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};

use tokio::net::{UdpSocket, UnixDatagram};

use super::{SocketFile, TransportError};

/// Sender of a received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Inet(SocketAddr),
    /// Unix datagram peer; `None` when the client socket is unbound and
    /// therefore cannot be answered.
    Local(Option<PathBuf>),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{addr}"),
            Self::Local(Some(path)) => write!(f, "{}", path.display()),
            Self::Local(None) => f.write_str("<unbound>"),
        }
    }
}

/// Datagram socket receiving `DELIVER` requests.
pub enum DatagramEndpoint {
    Udp(UdpSocket),
    Unix { socket: UnixDatagram, file: SocketFile },
}

impl DatagramEndpoint {
    /// Binds a UDP socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_udp(addr: SocketAddr) -> Result<Self, TransportError> {
        let bind_err = |e: io::Error| TransportError::Bind {
            kind: "datagram",
            address: addr.to_string(),
            error: e.to_string(),
        };

        let std_socket = std::net::UdpSocket::bind(addr).map_err(bind_err)?;
        std_socket.set_nonblocking(true).map_err(bind_err)?;
        let socket = UdpSocket::from_std(std_socket).map_err(bind_err)?;
        Ok(Self::Udp(socket))
    }

    /// Binds a Unix datagram socket, replacing a stale socket file.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_unix(path: &Path) -> Result<Self, TransportError> {
        let file = SocketFile::prepare(path)?;
        let socket = UnixDatagram::bind(path).map_err(|e| TransportError::Bind {
            kind: "datagram",
            address: path.display().to_string(),
            error: e.to_string(),
        })?;
        Ok(Self::Unix { socket, file })
    }

    /// Readiness for receiving; does not consume a datagram.
    pub fn poll_recv_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self {
            Self::Udp(socket) => socket.poll_recv_ready(cx),
            Self::Unix { socket, .. } => socket.poll_recv_ready(cx),
        }
    }

    /// Receives exactly one datagram without blocking.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Peer)> {
        match self {
            Self::Udp(socket) => socket
                .try_recv_from(buf)
                .map(|(len, addr)| (len, Peer::Inet(addr))),
            Self::Unix { socket, .. } => socket.try_recv_from(buf).map(|(len, addr)| {
                let path = addr.as_pathname().map(Path::to_path_buf);
                (len, Peer::Local(path))
            }),
        }
    }

    /// Sends one datagram without blocking.
    ///
    /// # Errors
    ///
    /// Fails with `NotConnected` for an unbound Unix peer, and with a
    /// mismatch error when the peer kind does not match the socket.
    pub fn try_send_to(&self, buf: &[u8], peer: &Peer) -> io::Result<usize> {
        match (self, peer) {
            (Self::Udp(socket), Peer::Inet(addr)) => socket.try_send_to(buf, *addr),
            (Self::Unix { socket, .. }, Peer::Local(Some(path))) => socket.try_send_to(buf, path),
            (Self::Unix { .. }, Peer::Local(None)) => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "peer socket is unbound",
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "peer address does not match socket family",
            )),
        }
    }

    /// Bound address for UDP sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Udp(socket) => socket.local_addr().ok(),
            Self::Unix { .. } => None,
        }
    }

    /// Human-readable bound address for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Udp(socket) => match socket.local_addr() {
                Ok(addr) => format!("udp://{addr}"),
                Err(_) => "udp://?".to_string(),
            },
            Self::Unix { file, .. } => format!("unixgram://{}", file.path().display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_display() {
        let inet = Peer::Inet("127.0.0.1:9000".parse().unwrap());
        assert_eq!(inet.to_string(), "127.0.0.1:9000");
        assert_eq!(Peer::Local(None).to_string(), "<unbound>");
        assert_eq!(
            Peer::Local(Some(PathBuf::from("/tmp/c.sock"))).to_string(),
            "/tmp/c.sock"
        );
    }

    #[tokio::test]
    async fn test_unbound_unix_peer_cannot_be_answered() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = DatagramEndpoint::bind_unix(&dir.path().join("d.sock")).unwrap();
        let err = endpoint.try_send_to(b"hi", &Peer::Local(None)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_mismatched_peer_family() {
        let endpoint = DatagramEndpoint::bind_udp("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = endpoint
            .try_send_to(b"hi", &Peer::Local(Some(PathBuf::from("/tmp/x"))))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(endpoint.local_addr().is_some());
    }
}
