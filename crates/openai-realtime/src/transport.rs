use crate::error::ConnectionError;
use async_trait::async_trait;
use openai_realtime_types::ClientEvent;

/// A frame received from the agent, after transport-level noise
/// (binary frames, server pings) has been filtered out.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Pong,
    Close(Option<String>),
}

/// The outbound half of a duplex connection.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ConnectionError>;

    async fn ping(&mut self) -> Result<(), ConnectionError>;

    /// Performs the close handshake. Bounded by the transport's close timeout.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// The inbound half of a duplex connection.
#[async_trait]
pub trait EventStream: Send {
    /// Returns `None` once the peer is gone.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, ConnectionError>>;
}

/// An open connection, exclusively owned by the protocol loop that opened it.
pub struct Connection {
    pub sink: Box<dyn EventSink>,
    pub stream: Box<dyn EventStream>,
}

impl Connection {
    pub fn new(sink: Box<dyn EventSink>, stream: Box<dyn EventStream>) -> Self {
        Self { sink, stream }
    }
}

/// Opens new connections; called once per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection, ConnectionError>;
}
