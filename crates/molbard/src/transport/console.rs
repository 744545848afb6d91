//! Operator console.
//!
//! Lines are read on a dedicated OS thread and forwarded over a bounded
//! channel. The reactor only polls the receiving end.

use std::io::BufRead;
use std::task::{Context, Poll};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines buffered between the reader thread and the reactor.
const CONSOLE_BUFFER: usize = 16;

/// Line source for console commands.
#[derive(Debug)]
pub struct Console {
    lines: mpsc::Receiver<String>,
}

impl Console {
    /// Wraps an existing line channel (used by tests and embedders).
    pub fn from_channel(lines: mpsc::Receiver<String>) -> Self {
        Self { lines }
    }

    /// Console reading the process's standard input.
    pub fn stdin() -> Self {
        Self::spawn_reader("console-stdin", || std::io::stdin().lock())
    }

    /// Spawns a reader thread over any buffered reader.
    ///
    /// The thread ends at EOF, on a read error, or once the console has
    /// been dropped.
    pub fn spawn_reader<R, F>(name: &str, open: F) -> Self
    where
        R: BufRead,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CONSOLE_BUFFER);

        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let reader = open();
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if tx.blocking_send(line).is_err() {
                                debug!("Console closed, reader exiting");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Console read failed");
                            break;
                        }
                    }
                }
            });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn console reader; console disabled");
        }

        Self { lines: rx }
    }

    /// Polls for the next line. `Ready(None)` means the console reached
    /// EOF and should be deregistered.
    pub fn poll_line(&mut self, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.lines.poll_recv(cx)
    }
}
