//! WebSocket transport for the OpenAI Realtime API.

use crate::{
    error::ConnectionError,
    transport::{Connection, Connector, EventSink, EventStream, InboundFrame},
};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use openai_realtime_types::ClientEvent;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::HeaderValue,
        protocol::Message,
    },
};
use tracing::{info, warn};

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";
/// Declared sub-protocol version, sent as the `OpenAI-Beta` header.
pub const REALTIME_BETA_HEADER: &str = "realtime=v1";
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(120);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens authenticated WebSocket connections to the realtime endpoint.
pub struct WebSocketConnector {
    url: String,
    model: String,
    api_key: SecretString,
    close_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, model: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            api_key,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}?model={}", self.url, self.model)
    }

    fn request(&self) -> Result<Request, ConnectionError> {
        let mut request = self.endpoint().into_client_request()?;
        let bearer = format!("Bearer {}", self.api_key.expose_secret())
            .parse::<HeaderValue>()
            .map_err(|e| ConnectionError::Request(format!("invalid credential: {e}")))?;
        request.headers_mut().insert("Authorization", bearer);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static(REALTIME_BETA_HEADER));
        Ok(request)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Connection, ConnectionError> {
        let request = self.request()?;
        let (ws_stream, _) = connect_async(request).await?;
        info!(model = %self.model, "Connected to OpenAI Realtime API.");
        let (sink, stream) = ws_stream.split();
        Ok(Connection::new(
            Box::new(WebSocketSink {
                inner: sink,
                close_timeout: self.close_timeout,
            }),
            Box::new(WebSocketEvents { inner: stream }),
        ))
    }
}

struct WebSocketSink {
    inner: SplitSink<WsStream, Message>,
    close_timeout: Duration,
}

#[async_trait]
impl EventSink for WebSocketSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ConnectionError> {
        let payload = serde_json::to_string(event)?;
        self.inner.send(Message::Text(payload.into())).await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), ConnectionError> {
        self.inner.send(Message::Ping(Default::default())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        match tokio::time::timeout(self.close_timeout, self.inner.close()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(timeout = ?self.close_timeout, "Close handshake timed out.");
                Ok(())
            }
        }
    }
}

struct WebSocketEvents {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl EventStream for WebSocketEvents {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, ConnectionError>> {
        loop {
            let frame = match self.inner.next().await? {
                Ok(Message::Text(text)) => InboundFrame::Text(text.to_string()),
                Ok(Message::Pong(_)) => InboundFrame::Pong,
                Ok(Message::Close(frame)) => {
                    InboundFrame::Close(frame.map(|f| f.reason.to_string()))
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            };
            return Some(Ok(frame));
        }
    }
}
