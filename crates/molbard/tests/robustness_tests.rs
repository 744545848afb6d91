//! Robustness tests for the reactor.
//!
//! These tests verify the server handles edge cases and error conditions:
//! - Connection capacity limits
//! - Idle timeout and re-arming
//! - Malformed, oversized and non-UTF-8 input
//! - Abrupt disconnects
//! - Fatal startup errors
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::{IpAddr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use molbar_core::{Atom, AtomCounts};
use molbard::client::{DatagramRequester, ServerAddr, StreamSupplier};
use molbard::config::ServerConfig;
use molbard::reactor::{Reactor, ReactorError, ReactorOptions, ShutdownReason, ShutdownReport};
use molbard::store::{MemoryInventory, StoreError};
use molbard::transport::{TransportBinding, TransportError};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const STATE_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    stream_path: PathBuf,
    datagram_path: PathBuf,
    cancel_token: CancellationToken,
    inventory: watch::Receiver<AtomCounts>,
    handle: JoinHandle<ShutdownReport>,
    temp_dir: TempDir,
}

impl TestServer {
    async fn spawn(initial: AtomCounts, max_clients: usize, idle: Option<Duration>) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let stream_path = temp_dir.path().join("bar.sock");
        let datagram_path = temp_dir.path().join("bar.dgram");

        let endpoints = TransportBinding::Local {
            stream_path: stream_path.clone(),
            datagram_path: datagram_path.clone(),
        }
        .bind()
        .expect("bind endpoints");

        let cancel_token = CancellationToken::new();
        let reactor = Reactor::new(
            endpoints,
            Box::new(MemoryInventory::new(initial)),
            ReactorOptions {
                max_clients,
                idle_timeout: idle,
            },
            cancel_token.clone(),
        );
        let inventory = reactor.subscribe_inventory();
        let handle = tokio::spawn(reactor.run());

        TestServer {
            stream_path,
            datagram_path,
            cancel_token,
            inventory,
            handle,
            temp_dir,
        }
    }

    async fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.stream_path)
            .await
            .expect("connect to server")
    }

    async fn wait_for_inventory(&mut self, expected: AtomCounts) {
        let rx = &mut self.inventory;
        let reached = timeout(STATE_WAIT_TIMEOUT, async {
            loop {
                if *rx.borrow_and_update() == expected {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        assert!(reached.is_ok(), "inventory never reached {expected}");
        assert_eq!(*self.inventory.borrow(), expected);
    }

    async fn shutdown(self) -> ShutdownReport {
        self.cancel_token.cancel();
        timeout(SHUTDOWN_TIMEOUT, self.handle)
            .await
            .expect("reactor did not stop")
            .expect("reactor task panicked")
    }
}

/// Reads until EOF or timeout; returns the number of bytes seen.
async fn read_to_eof(stream: &mut UnixStream) -> Option<usize> {
    let mut total = 0;
    let mut buf = [0u8; 64];
    loop {
        match timeout(STATE_WAIT_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(0)) => return Some(total),
            Ok(Ok(n)) => total += n,
            Ok(Err(_)) => return Some(total),
            Err(_) => return None,
        }
    }
}

// ============================================================================
// Capacity
// ============================================================================

#[tokio::test]
async fn test_connection_over_capacity_sees_eof() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 2, None).await;

    let mut first = server.connect().await;
    first.write_all(b"ADD CARBON 1\n").await.unwrap();
    server.wait_for_inventory(AtomCounts::new(1, 0, 0)).await;

    let mut second = server.connect().await;
    second.write_all(b"ADD CARBON 1\n").await.unwrap();
    server.wait_for_inventory(AtomCounts::new(2, 0, 0)).await;

    let mut third = server.connect().await;
    assert_eq!(read_to_eof(&mut third).await, Some(0));

    // Registered clients keep working.
    first.write_all(b"ADD HYDROGEN 3\n").await.unwrap();
    server.wait_for_inventory(AtomCounts::new(2, 3, 0)).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_slot_freed_after_disconnect() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 1, None).await;

    let mut first = server.connect().await;
    first.write_all(b"ADD OXYGEN 1\n").await.unwrap();
    server.wait_for_inventory(AtomCounts::new(0, 0, 1)).await;
    first.write_all(b"EXIT\n").await.unwrap();
    assert_eq!(read_to_eof(&mut first).await, Some(0));

    let mut second = server.connect().await;
    second.write_all(b"ADD OXYGEN 1\n").await.unwrap();
    server.wait_for_inventory(AtomCounts::new(0, 0, 2)).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 3, None).await;

    for _ in 0..20 {
        let stream = server.connect().await;
        drop(stream);
    }

    let mut supplier = StreamSupplier::connect(&ServerAddr::Local(server.stream_path.clone()))
        .await
        .unwrap();
    supplier.add(Atom::Carbon, 1).await.unwrap();
    server.wait_for_inventory(AtomCounts::new(1, 0, 0)).await;

    server.shutdown().await;
}

// ============================================================================
// Idle timeout
// ============================================================================

#[tokio::test]
async fn test_idle_timeout_exits_with_success() {
    let server = TestServer::spawn(AtomCounts::new(4, 4, 4), 9, Some(Duration::from_millis(300))).await;

    let report = timeout(SHUTDOWN_TIMEOUT, server.handle)
        .await
        .expect("idle timeout never fired")
        .unwrap();

    assert_eq!(report.reason, ShutdownReason::IdleTimeout);
    assert!(!report.reason.is_failure());
    assert_eq!(report.inventory, AtomCounts::new(4, 4, 4));
    assert!(!server.stream_path.exists());
}

#[tokio::test]
async fn test_activity_rearms_idle_timer() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 9, Some(Duration::from_millis(800))).await;
    let mut stream = server.connect().await;

    for i in 1..=6 {
        stream.write_all(b"ADD CARBON 1\n").await.unwrap();
        server.wait_for_inventory(AtomCounts::new(i, 0, 0)).await;
        sleep(Duration::from_millis(250)).await;
    }
    assert!(!server.handle.is_finished());

    // Silence lets it expire.
    let report = timeout(SHUTDOWN_TIMEOUT, server.handle).await.unwrap().unwrap();
    assert_eq!(report.reason, ShutdownReason::IdleTimeout);
    assert_eq!(report.connections_closed, 1);
}

// ============================================================================
// Malformed input
// ============================================================================

#[tokio::test]
async fn test_malformed_lines_change_nothing() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 9, None).await;
    let mut stream = server.connect().await;

    stream
        .write_all(
            b"\n\
              ADD\n\
              ADD CARBON\n\
              ADD CARBON 0\n\
              ADD CARBON -4\n\
              ADD CARBON many\n\
              ADD GOLD 5\n\
              add carbon 5\n\
              DELIVER WATER 1\n\
              GEN VODKA\n\
              \xff\xfe\xfd\n",
        )
        .await
        .unwrap();
    stream.write_all(b"ADD OXYGEN 2\n").await.unwrap();

    server.wait_for_inventory(AtomCounts::new(0, 0, 2)).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_line_discarded() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 9, None).await;
    let mut stream = server.connect().await;

    let long = vec![b'A'; 4096];
    stream.write_all(&long).await.unwrap();
    stream.write_all(b"\nADD HYDROGEN 5\n").await.unwrap();

    server.wait_for_inventory(AtomCounts::new(0, 5, 0)).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_line_tail_is_not_a_command() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 9, None).await;
    let mut stream = server.connect().await;

    let mut long = vec![b'x'; 512];
    long.extend_from_slice(b"ADD CARBON 9\n");
    stream.write_all(&long).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stream.write_all(b"ADD OXYGEN 1\n").await.unwrap();

    server.wait_for_inventory(AtomCounts::new(0, 0, 1)).await;
    let report = server.shutdown().await;
    assert_eq!(report.inventory, AtomCounts::new(0, 0, 1));
}

#[tokio::test]
async fn test_oversized_line_split_across_writes() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 9, None).await;
    let mut stream = server.connect().await;

    stream.write_all(&[b'y'; 300]).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stream.write_all(b" ADD CARBON 4\nADD HYDROGEN 2\n").await.unwrap();

    server.wait_for_inventory(AtomCounts::new(0, 2, 0)).await;
    let report = server.shutdown().await;
    assert_eq!(report.inventory, AtomCounts::new(0, 2, 0));
}

#[tokio::test]
async fn test_line_split_across_writes() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 9, None).await;
    let mut stream = server.connect().await;

    stream.write_all(b"ADD CAR").await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stream.write_all(b"BON 7\nADD OXY").await.unwrap();
    sleep(Duration::from_millis(50)).await;
    stream.write_all(b"GEN 1\n").await.unwrap();

    server.wait_for_inventory(AtomCounts::new(7, 0, 1)).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_unterminated_line_applied_on_disconnect() {
    let mut server = TestServer::spawn(AtomCounts::ZERO, 9, None).await;
    let mut stream = server.connect().await;

    stream.write_all(b"ADD OXYGEN 3").await.unwrap();
    drop(stream);

    server.wait_for_inventory(AtomCounts::new(0, 0, 3)).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_failed_withdrawal_is_idempotent() {
    let server = TestServer::spawn(AtomCounts::new(1, 5, 0), 9, None).await;
    let requester = DatagramRequester::unix(
        &server.datagram_path,
        &server.temp_dir.path().join("requester.sock"),
    )
    .unwrap();

    for _ in 0..5 {
        let reply = requester.deliver("WATER", 1).await.unwrap();
        assert!(!reply.is_success());
        let reply = requester.deliver("UNOBTAINIUM", 1).await.unwrap();
        assert!(!reply.is_success());
    }

    let report = server.shutdown().await;
    assert_eq!(report.inventory, AtomCounts::new(1, 5, 0));
}

#[tokio::test]
async fn test_oversized_datagram_gets_error_reply() {
    let server = TestServer::spawn(AtomCounts::new(0, 2, 1), 9, None).await;
    let reply_path = server.temp_dir.path().join("padded.sock");
    let client = tokio::net::UnixDatagram::bind(&reply_path).unwrap();

    let mut request = b"DELIVER WATER 1\n".to_vec();
    request.extend(std::iter::repeat(b' ').take(200));
    request.extend(std::iter::repeat(b'!').take(100));
    client.send_to(&request, &server.datagram_path).await.unwrap();

    let mut buf = [0u8; 256];
    let len = timeout(Duration::from_secs(5), client.recv(&mut buf))
        .await
        .expect("no reply")
        .unwrap();
    let reply = String::from_utf8_lossy(&buf[..len]).to_string();
    assert!(reply.starts_with("ERROR: "), "{reply}");

    let report = server.shutdown().await;
    assert_eq!(report.inventory, AtomCounts::new(0, 2, 1));
}

#[tokio::test]
async fn test_unbound_datagram_peer_does_not_stop_server() {
    let mut server = TestServer::spawn(AtomCounts::new(0, 2, 1), 9, None).await;

    let anonymous = tokio::net::UnixDatagram::unbound().unwrap();
    anonymous
        .send_to(b"DELIVER WATER 1", &server.datagram_path)
        .await
        .unwrap();

    // Applied even though the reply cannot be sent.
    server.wait_for_inventory(AtomCounts::ZERO).await;
    server.shutdown().await;
}

// ============================================================================
// Fatal startup errors
// ============================================================================

#[tokio::test]
async fn test_backing_file_size_mismatch_is_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let save_file = temp_dir.path().join("stock.bin");
    std::fs::write(&save_file, b"short").unwrap();

    let config = ServerConfig {
        binding: TransportBinding::Local {
            stream_path: temp_dir.path().join("bar.sock"),
            datagram_path: temp_dir.path().join("bar.dgram"),
        },
        initial: AtomCounts::ZERO,
        save_file: Some(save_file),
        max_clients: 9,
        idle_timeout: None,
    };

    let result = Reactor::from_config(&config, CancellationToken::new());
    assert!(matches!(
        result,
        Err(ReactorError::Store(StoreError::SizeMismatch { actual: 5, .. }))
    ));
}

#[tokio::test]
async fn test_port_in_use_is_fatal() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let config = ServerConfig {
        binding: TransportBinding::Inet {
            host: IpAddr::from([127, 0, 0, 1]),
            stream_port: port,
            datagram_port: 0,
        },
        initial: AtomCounts::ZERO,
        save_file: None,
        max_clients: 9,
        idle_timeout: None,
    };

    let result = Reactor::from_config(&config, CancellationToken::new());
    assert!(matches!(
        result,
        Err(ReactorError::Transport(TransportError::Bind { kind: "stream", .. }))
    ));
}
