use openai_realtime::ConnectionError;
use openai_realtime_types::InboundDecodeError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("undecodable inbound frame: {0}")]
    Decode(#[from] InboundDecodeError),
    #[error("audio device error: {0:#}")]
    Device(#[source] anyhow::Error),
}

impl SessionError {
    /// Whether the session should reconnect rather than stop.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Connection(e) if e.is_keepalive_timeout())
    }
}
