//! In-process duplex transport.
//!
//! [`pair`] returns a client-side [`Connection`] together with the
//! [`RemoteEnd`] that plays the agent: it pushes inbound frames and observes
//! every event the client sends. [`MemoryConnector`] hands out prepared
//! connections one per `connect` call.

use crate::{
    error::ConnectionError,
    transport::{Connection, Connector, EventSink, EventStream, InboundFrame},
};
use async_trait::async_trait;
use openai_realtime_types::ClientEvent;
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::mpsc;

type FrameResult = Result<InboundFrame, ConnectionError>;

/// Peer behaviour when the client sends a keep-alive ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingReply {
    Pong,
    Silent,
}

/// The agent side of an in-memory connection.
pub struct RemoteEnd {
    inbound: mpsc::UnboundedSender<FrameResult>,
    outbound: mpsc::UnboundedReceiver<ClientEvent>,
    closed: mpsc::UnboundedReceiver<()>,
}

impl RemoteEnd {
    /// Queues a JSON text frame for the client.
    pub fn push_json(&self, value: serde_json::Value) {
        let _ = self.inbound.send(Ok(InboundFrame::Text(value.to_string())));
    }

    pub fn push_frame(&self, frame: InboundFrame) {
        let _ = self.inbound.send(Ok(frame));
    }

    pub fn push_error(&self, error: ConnectionError) {
        let _ = self.inbound.send(Err(error));
    }

    /// Next event the client sent, if one is already queued.
    pub fn try_next_sent(&mut self) -> Option<ClientEvent> {
        self.outbound.try_recv().ok()
    }

    pub async fn next_sent(&mut self) -> Option<ClientEvent> {
        self.outbound.recv().await
    }

    /// Drains every event the client has sent so far.
    pub fn sent(&mut self) -> Vec<ClientEvent> {
        std::iter::from_fn(|| self.try_next_sent()).collect()
    }

    /// Whether the client performed its close handshake.
    pub fn was_closed(&mut self) -> bool {
        self.closed.try_recv().is_ok()
    }
}

struct MemorySink {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    inbound: mpsc::UnboundedSender<FrameResult>,
    closed: mpsc::UnboundedSender<()>,
    ping_reply: PingReply,
}

#[async_trait]
impl EventSink for MemorySink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ConnectionError> {
        self.outbound
            .send(event.clone())
            .map_err(|_| ConnectionError::closed(Some("remote end dropped".to_string())))
    }

    async fn ping(&mut self) -> Result<(), ConnectionError> {
        if self.ping_reply == PingReply::Pong {
            let _ = self.inbound.send(Ok(InboundFrame::Pong));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        let _ = self.closed.send(());
        Ok(())
    }
}

struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<FrameResult>,
}

#[async_trait]
impl EventStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<FrameResult> {
        self.inbound.recv().await
    }
}

/// Creates a connected client/agent pair.
pub fn pair(ping_reply: PingReply) -> (Connection, RemoteEnd) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let connection = Connection::new(
        Box::new(MemorySink {
            outbound: outbound_tx,
            inbound: inbound_tx.clone(),
            closed: closed_tx,
            ping_reply,
        }),
        Box::new(MemoryStream {
            inbound: inbound_rx,
        }),
    );
    let remote = RemoteEnd {
        inbound: inbound_tx,
        outbound: outbound_rx,
        closed: closed_rx,
    };
    (connection, remote)
}

/// Hands out prepared connections in order; refuses once they run out.
#[derive(Default)]
pub struct MemoryConnector {
    pending: Mutex<VecDeque<Connection>>,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares one more connection and returns its agent side.
    pub fn prepare(&self, ping_reply: PingReply) -> RemoteEnd {
        let (connection, remote) = pair(ping_reply);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(connection);
        remote
    }

    /// Number of `connect` calls so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Connection, ConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| ConnectionError::Refused("no prepared connection".to_string()))
    }
}
