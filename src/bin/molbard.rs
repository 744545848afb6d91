//! molbard - molecule bar inventory server
//!
//! Serves atom suppliers over a stream socket, molecule requests over a
//! datagram socket and drink orders from the operator console on stdin.
//!
//! # Usage
//!
//! ```bash
//! # TCP supplier port 5555, UDP request port 5556, some initial stock
//! molbard -T 5555 -U 5556 -c 100 -H 200 -o 100
//!
//! # Unix sockets, shared inventory file, stop after 60 idle seconds
//! molbard -s /tmp/molbar.sock -d /tmp/molbar.dgram -f /tmp/stock.bin -t 60
//!
//! # Settings from a file
//! MOLBAR_CONFIG=/etc/molbar.toml molbard
//!
//! # Enable debug logging
//! RUST_LOG=molbard=debug molbard -T 5555 -U 5556
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use molbard::config::{ServerArgs, ServerConfig};
use molbard::reactor::Reactor;
use molbard::transport::Console;

fn main() -> Result<()> {
    let args = ServerArgs::parse();
    let config = ServerConfig::load(&args).context("Invalid configuration")?;

    let failed = run_server(config)?;
    if failed {
        process::exit(1);
    }
    Ok(())
}

/// Runs the reactor to completion. Returns true if it stopped on a failure.
#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("molbard=info".parse()?)
                .add_directive("molbar_core=info".parse()?)
                .add_directive("molbar_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        binding = %config.binding,
        "molbard starting"
    );

    let cancel_token = CancellationToken::new();
    let reactor = Reactor::from_config(&config, cancel_token.clone())
        .context("Failed to start server")?
        .with_console(Console::stdin());

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let report = reactor.run().await;
    info!(
        reason = %report.reason,
        inventory = %report.inventory,
        "molbard stopped"
    );

    Ok(report.reason.is_failure())
}

/// Waits for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}
