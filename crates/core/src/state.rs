//! Per-connection protocol state owned by the session loop.

use crate::{audio_buffer::AudioBuffer, executor::FunctionExecutor, playback::PlaybackSink};
use openai_realtime::{
    ConnectionError, EventSink,
    diagnostics::{Direction, log_ws_event},
};
use openai_realtime_types::ClientEvent;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};

/// Whose turn it is, as projected from the audio gates and protocol flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    UserSpeaking,
    AssistantResponding,
    AwaitingRateLimit,
}

/// Connection lifecycle of a [`SessionProtocol`](crate::session::SessionProtocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Configuring,
    Active,
    Closing,
    Reconnecting,
}

/// Notifications for the user-facing side of the process.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connection(ConnectionState),
    Turn(TurnState),
    TextDelta(String),
    ResponseCompleted {
        text: String,
        latency: Option<Duration>,
    },
    FunctionCalled {
        name: String,
        error: Option<String>,
    },
}

/// A function call whose arguments are still streaming in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFunctionCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// What has arrived so far for the response in flight.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    pub audio_chunks: Vec<Vec<u8>>,
    pub text: String,
    pub started_at: Option<Instant>,
}

impl ResponseAccumulator {
    pub fn is_empty(&self) -> bool {
        self.audio_chunks.is_empty() && self.text.is_empty() && self.started_at.is_none()
    }
}

/// Process-scoped collaborators, shared by every connection of a session.
#[derive(Clone)]
pub struct SessionContext {
    pub audio: Arc<AudioBuffer>,
    pub executor: Arc<FunctionExecutor>,
    pub playback: Arc<dyn PlaybackSink>,
    pub events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl SessionContext {
    /// A context with a fresh capture buffer and no event listener.
    pub fn new(executor: FunctionExecutor, playback: Arc<dyn PlaybackSink>) -> Self {
        Self {
            audio: Arc::new(AudioBuffer::new()),
            executor: Arc::new(executor),
            playback,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn notify(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // The receiver going away only means nobody is watching.
            let _ = events.send(event);
        }
    }
}

/// The outbound half of the connection, logging each event it sends.
pub struct Outbound {
    sink: Box<dyn EventSink>,
}

impl Outbound {
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub async fn send(&mut self, event: ClientEvent) -> Result<(), ConnectionError> {
        log_ws_event(Direction::Outgoing, event.kind());
        self.sink.send(&event).await
    }

    pub async fn ping(&mut self) -> Result<(), ConnectionError> {
        self.sink.ping().await
    }

    pub async fn close(&mut self) -> Result<(), ConnectionError> {
        self.sink.close().await
    }
}

/// Everything the inbound handlers read and mutate. Lives for exactly one
/// connection attempt, so a reconnect starts from a clean slate.
pub struct ProtocolState {
    pub ctx: SessionContext,
    pub outbound: Outbound,
    pub pending_call: Option<PendingFunctionCall>,
    pub response: ResponseAccumulator,
    pub response_in_progress: bool,
    pub awaiting_rate_limit: bool,
}

impl ProtocolState {
    pub fn new(ctx: SessionContext, sink: Box<dyn EventSink>) -> Self {
        Self {
            ctx,
            outbound: Outbound::new(sink),
            pending_call: None,
            response: ResponseAccumulator::default(),
            response_in_progress: false,
            awaiting_rate_limit: false,
        }
    }

    pub fn turn_state(&self) -> TurnState {
        let audio = &self.ctx.audio;
        if audio.is_receiving() {
            TurnState::AssistantResponding
        } else if audio.is_recording() {
            TurnState::UserSpeaking
        } else if self.awaiting_rate_limit {
            TurnState::AwaitingRateLimit
        } else {
            TurnState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::MockPlaybackSink;
    use openai_realtime::memory::{PingReply, pair};

    fn state() -> ProtocolState {
        let (connection, _remote) = pair(PingReply::Pong);
        let ctx = SessionContext::new(FunctionExecutor::new(), Arc::new(MockPlaybackSink::new()));
        ProtocolState::new(ctx, connection.sink)
    }

    #[test]
    fn test_turn_state_projection() {
        let mut state = state();
        assert_eq!(state.turn_state(), TurnState::Idle);

        state.ctx.audio.start_recording();
        assert_eq!(state.turn_state(), TurnState::UserSpeaking);

        state.ctx.audio.start_receiving();
        assert_eq!(state.turn_state(), TurnState::AssistantResponding);
        // Forcing capture back on cannot overlap the assistant's turn.
        state.ctx.audio.start_recording();
        assert_eq!(state.turn_state(), TurnState::AssistantResponding);

        state.ctx.audio.reset();
        state.awaiting_rate_limit = true;
        assert_eq!(state.turn_state(), TurnState::AwaitingRateLimit);
    }

    #[test]
    fn test_new_state_is_clean() {
        let state = state();
        assert!(state.pending_call.is_none());
        assert!(state.response.is_empty());
        assert!(!state.response_in_progress);
    }

    #[test]
    fn test_notify_without_listener_is_noop() {
        let state = state();
        state.ctx.notify(SessionEvent::Turn(TurnState::Idle));
    }
}
