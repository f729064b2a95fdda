use tokio_tungstenite::tungstenite;

/// Marker the transport puts in a closure reason when the peer stopped
/// answering keep-alive pings.
pub const KEEPALIVE_TIMEOUT_MARKER: &str = "keepalive ping timeout";

/// Failures of the duplex connection itself.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("keepalive ping timeout")]
    KeepAliveTimeout,
    #[error("connection closed: {reason}")]
    Closed { reason: String },
    #[error("invalid connection request: {0}")]
    Request(String),
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

impl ConnectionError {
    pub fn closed(reason: Option<String>) -> Self {
        ConnectionError::Closed {
            reason: reason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "no close reason given".to_string()),
        }
    }

    /// Transient losses are recovered by reconnecting; everything else is fatal.
    pub fn is_keepalive_timeout(&self) -> bool {
        match self {
            ConnectionError::KeepAliveTimeout => true,
            ConnectionError::Closed { reason } => reason.contains(KEEPALIVE_TIMEOUT_MARKER),
            _ => false,
        }
    }
}
