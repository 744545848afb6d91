//! One live stream client.

use std::io;
use std::task::{Context, Poll};

use molbar_protocol::MAX_LINE_LEN;
use tracing::{debug, warn};

use super::context::BarContext;
use super::table::Disposition;
use crate::handlers::{self, LineOutcome};
use crate::transport::ClientStream;

/// Bytes read per readiness notification.
pub const READ_CHUNK: usize = 256;

/// A registered stream connection and its partial-line buffer.
pub struct Session {
    id: u64,
    stream: ClientStream,
    pending: Vec<u8>,
    /// Set after an overlong line was dropped; cleared at its newline.
    discarding: bool,
}

impl Session {
    pub fn new(id: u64, stream: ClientStream) -> Self {
        Self {
            id,
            stream,
            pending: Vec::with_capacity(READ_CHUNK),
            discarding: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> String {
        self.stream.peer()
    }

    pub fn poll_read_ready(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.stream.poll_read_ready(cx)
    }

    /// Reads one chunk and applies every complete line in it.
    pub fn service(&mut self, ctx: &mut BarContext) -> Disposition {
        let mut buf = [0u8; READ_CHUNK];
        match self.stream.try_read(&mut buf) {
            Ok(0) => {
                // Peer closed: a final unterminated line still counts.
                let rest = std::mem::take(&mut self.pending);
                if !rest.is_empty() && !self.discarding {
                    self.apply(ctx, &rest);
                }
                debug!(connection = self.id, "Client disconnected");
                Disposition::Remove
            }
            Ok(n) => {
                self.pending
                    .extend_from_slice(buf.get(..n).unwrap_or_default());
                self.drain_lines(ctx)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Disposition::Keep,
            Err(e) => {
                warn!(connection = self.id, error = %e, "Read failed, dropping client");
                Disposition::Remove
            }
        }
    }

    fn drain_lines(&mut self, ctx: &mut BarContext) -> Disposition {
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if self.discarding {
                // Tail of an overlong line.
                self.discarding = false;
                continue;
            }
            if self.apply(ctx, &line) == LineOutcome::Close {
                return Disposition::Remove;
            }
        }

        if self.pending.len() > MAX_LINE_LEN {
            if !self.discarding {
                warn!(
                    connection = self.id,
                    max = MAX_LINE_LEN,
                    "Line too long, discarding"
                );
            }
            self.discarding = true;
            self.pending.clear();
        }
        Disposition::Keep
    }

    fn apply(&self, ctx: &mut BarContext, line: &[u8]) -> LineOutcome {
        let text = String::from_utf8_lossy(line);
        handlers::handle_stream_line(ctx, self.id, &text)
    }
}
