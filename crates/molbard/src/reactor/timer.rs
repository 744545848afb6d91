//! Idle timer.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};

/// Single countdown re-armed by every unit of I/O activity.
///
/// A timer built without a timeout never expires.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl IdleTimer {
    /// Starts the countdown now. `None` or a zero duration disables it.
    pub fn new(timeout: Option<Duration>) -> Self {
        let timeout = timeout.filter(|t| !t.is_zero());
        Self {
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[cfg(test)]
    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Restarts the countdown from now.
    pub fn rearm(&mut self) {
        self.deadline = self.timeout.map(|t| Instant::now() + t);
    }

    #[cfg(test)]
    fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves at the current deadline; pending forever when disabled.
    ///
    /// The returned future owns a copy of the deadline, so re-arming
    /// afterwards needs a fresh call.
    pub fn expiry(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        }
    }
}
