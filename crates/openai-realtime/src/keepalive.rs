use crate::error::ConnectionError;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Tracks outstanding keep-alive pings on one connection.
///
/// Only the oldest unanswered ping counts: a pong acknowledges everything
/// sent so far, and the connection is declared lost once a ping has gone
/// unanswered for longer than `timeout`.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    interval: Duration,
    timeout: Duration,
    awaiting_since: Option<Instant>,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new(DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT)
    }
}

impl KeepAlive {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            awaiting_since: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ping_sent(&mut self, now: Instant) {
        self.awaiting_since.get_or_insert(now);
    }

    pub fn pong_received(&mut self) {
        self.awaiting_since = None;
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting_since.is_some()
    }

    pub fn check(&self, now: Instant) -> Result<(), ConnectionError> {
        match self.awaiting_since {
            Some(sent) if now.saturating_duration_since(sent) > self.timeout => {
                Err(ConnectionError::KeepAliveTimeout)
            }
            _ => Ok(()),
        }
    }
}
