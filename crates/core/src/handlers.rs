//! Inbound event handlers.
//!
//! Each handler reacts to exactly one event tag and keeps local state a
//! projection of the turn boundaries the server declares. Handler errors are
//! reported by the session loop and never end the session.

use crate::state::{PendingFunctionCall, ProtocolState, SessionEvent};
use anyhow::Context;
use base64::{Engine, engine::general_purpose::STANDARD};
use futures::future::BoxFuture;
use openai_realtime::{EventRegistry, Handler, diagnostics::log_runtime};
use openai_realtime_types::{
    ClientEvent, InboundEvent, Item,
    events::server::{
        ErrorEvent, RateLimitsUpdatedEvent, ResponseAudioDeltaEvent,
        ResponseFunctionCallArgumentsDeltaEvent, ResponseFunctionCallArgumentsDoneEvent,
        ResponseOutputItemAddedEvent, ResponseTextDeltaEvent,
    },
    server_event,
};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const BUFFER_EMPTY: &str = "buffer is empty";
const ACTIVE_RESPONSE: &str = "Conversation already has an active response";

/// Wraps a `ProtocolState` handler method as a registry entry.
macro_rules! handler {
    ($method:ident) => {{
        fn handler<'a>(
            state: &'a mut ProtocolState,
            event: &'a InboundEvent,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(state.$method(event))
        }
        handler as Handler<ProtocolState>
    }};
}

/// The handler table for every inbound tag the client reacts to.
pub fn protocol_registry() -> EventRegistry<ProtocolState> {
    let mut registry = EventRegistry::new();
    registry.register(server_event::SESSION_CREATED, handler!(on_session_ack));
    registry.register(server_event::SESSION_UPDATED, handler!(on_session_ack));
    registry.register(server_event::RESPONSE_CREATED, handler!(on_response_created));
    registry.register(
        server_event::RESPONSE_OUTPUT_ITEM_ADDED,
        handler!(on_output_item_added),
    );
    registry.register(
        server_event::RESPONSE_FUNCTION_CALL_ARGUMENTS_DELTA,
        handler!(on_function_call_arguments_delta),
    );
    registry.register(
        server_event::RESPONSE_FUNCTION_CALL_ARGUMENTS_DONE,
        handler!(on_function_call_arguments_done),
    );
    registry.register(server_event::RESPONSE_TEXT_DELTA, handler!(on_text_delta));
    registry.register(server_event::RESPONSE_AUDIO_DELTA, handler!(on_audio_delta));
    registry.register(server_event::RESPONSE_DONE, handler!(on_response_done));
    registry.register(server_event::ERROR, handler!(on_error));
    registry.register(
        server_event::INPUT_AUDIO_BUFFER_SPEECH_STARTED,
        handler!(on_speech_started),
    );
    registry.register(
        server_event::INPUT_AUDIO_BUFFER_SPEECH_STOPPED,
        handler!(on_speech_stopped),
    );
    registry.register(
        server_event::RATE_LIMITS_UPDATED,
        handler!(on_rate_limits_updated),
    );
    registry
}

/// Accumulated argument text as a JSON object. Anything else, including an
/// empty string, becomes `{}`.
pub fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!(arguments = %other, "Function arguments are not an object; using {{}}.");
            Value::Object(Map::new())
        }
        Err(e) => {
            warn!(error = %e, arguments = raw, "Unparseable function arguments; using {{}}.");
            Value::Object(Map::new())
        }
    }
}

impl ProtocolState {
    async fn on_session_ack(&mut self, event: &InboundEvent) -> anyhow::Result<()> {
        debug!(kind = event.kind(), "Session configuration acknowledged.");
        Ok(())
    }

    pub async fn on_response_created(&mut self, _event: &InboundEvent) -> anyhow::Result<()> {
        self.ctx.audio.start_receiving();
        self.response_in_progress = true;
        self.awaiting_rate_limit = false;
        Ok(())
    }

    pub async fn on_output_item_added(&mut self, event: &InboundEvent) -> anyhow::Result<()> {
        let body: ResponseOutputItemAddedEvent = event.decode()?;
        if !body.item.is_function_call() {
            return Ok(());
        }
        let call = PendingFunctionCall {
            call_id: body.item.call_id.unwrap_or_default(),
            name: body.item.name.unwrap_or_default(),
            arguments: String::new(),
        };
        if let Some(previous) = self.pending_call.replace(call) {
            warn!(call_id = %previous.call_id, "Superseded function call was never completed.");
        }
        Ok(())
    }

    pub async fn on_function_call_arguments_delta(
        &mut self,
        event: &InboundEvent,
    ) -> anyhow::Result<()> {
        let body: ResponseFunctionCallArgumentsDeltaEvent = event.decode()?;
        match self.pending_call.as_mut() {
            Some(call) => call.arguments.push_str(&body.delta),
            None => warn!(
                call_id = ?body.call_id,
                "Dropping function call arguments with no call in progress."
            ),
        }
        Ok(())
    }

    pub async fn on_function_call_arguments_done(
        &mut self,
        event: &InboundEvent,
    ) -> anyhow::Result<()> {
        let Some(call) = self.pending_call.take() else {
            warn!("Function call arguments finished with no call in progress.");
            return Ok(());
        };
        let raw = if call.arguments.is_empty() {
            event
                .decode::<ResponseFunctionCallArgumentsDoneEvent>()
                .ok()
                .and_then(|done| done.arguments)
                .unwrap_or_default()
        } else {
            call.arguments
        };
        info!(function = %call.name, arguments = %raw, "Function call requested.");
        let arguments = parse_arguments(&raw);

        let result = self.ctx.executor.execute(&call.name, arguments).await;
        self.ctx.notify(SessionEvent::FunctionCalled {
            name: call.name.clone(),
            error: result.error.clone(),
        });

        if let Some(message) = result.error {
            self.outbound
                .send(ClientEvent::create_item(Item::assistant_text(message)))
                .await?;
        }
        self.outbound
            .send(ClientEvent::create_item(Item::function_call_output(
                call.call_id,
                result.output.to_string(),
            )))
            .await?;
        self.outbound.send(ClientEvent::create_response()).await?;
        Ok(())
    }

    pub async fn on_text_delta(&mut self, event: &InboundEvent) -> anyhow::Result<()> {
        let body: ResponseTextDeltaEvent = event.decode()?;
        self.response.text.push_str(&body.delta);
        self.ctx.notify(SessionEvent::TextDelta(body.delta));
        Ok(())
    }

    pub async fn on_audio_delta(&mut self, event: &InboundEvent) -> anyhow::Result<()> {
        let body: ResponseAudioDeltaEvent = event.decode()?;
        let chunk = STANDARD
            .decode(body.delta.as_bytes())
            .context("audio delta is not valid base64")?;
        self.response.audio_chunks.push(chunk);
        Ok(())
    }

    pub async fn on_response_done(&mut self, _event: &InboundEvent) -> anyhow::Result<()> {
        let response = std::mem::take(&mut self.response);
        let latency = response.started_at.map(|started| started.elapsed());
        if let Some(latency) = latency {
            log_runtime("realtime_api_response", latency);
        }
        info!("Assistant response complete.");

        if !response.audio_chunks.is_empty() {
            let pcm = response.audio_chunks.concat();
            info!(bytes = pcm.len(), "Playing assistant audio.");
            if let Err(e) = self.ctx.playback.play(pcm).await {
                error!(error = ?e, "Audio playback failed.");
            }
        }

        self.ctx.audio.stop_receiving();
        self.awaiting_rate_limit = true;
        self.ctx.notify(SessionEvent::ResponseCompleted {
            text: response.text,
            latency,
        });
        Ok(())
    }

    pub async fn on_error(&mut self, event: &InboundEvent) -> anyhow::Result<()> {
        let message = event
            .decode::<ErrorEvent>()
            .map(|body| body.error.message)
            .unwrap_or_default();
        if message.contains(BUFFER_EMPTY) {
            info!("Received 'buffer is empty' error, no audio data sent.");
        } else if message.contains(ACTIVE_RESPONSE) {
            info!("Received 'active response' error, adjusting response flow.");
            self.response_in_progress = true;
        } else {
            error!(message = %message, "Unhandled error event.");
        }
        Ok(())
    }

    pub async fn on_speech_started(&mut self, _event: &InboundEvent) -> anyhow::Result<()> {
        info!("Speech detected, listening...");
        Ok(())
    }

    pub async fn on_speech_stopped(&mut self, _event: &InboundEvent) -> anyhow::Result<()> {
        self.ctx.audio.stop_recording();
        info!("Speech ended, processing...");
        self.response.started_at = Some(Instant::now());
        self.outbound.send(ClientEvent::commit_audio()).await?;
        Ok(())
    }

    pub async fn on_rate_limits_updated(&mut self, event: &InboundEvent) -> anyhow::Result<()> {
        if let Ok(body) = event.decode::<RateLimitsUpdatedEvent>() {
            for limit in &body.rate_limits {
                debug!(name = %limit.name, remaining = ?limit.remaining, "Rate limit");
            }
        }
        self.response_in_progress = false;
        self.awaiting_rate_limit = false;
        self.ctx.audio.start_recording();
        info!("Resumed recording after rate_limits.updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio_buffer::AudioBuffer,
        playback::MockPlaybackSink,
        state::{SessionContext, TurnState},
        tools::builtin_executor,
    };
    use openai_realtime::{
        Dispatch,
        memory::{PingReply, RemoteEnd, pair},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Harness {
        state: ProtocolState,
        remote: RemoteEnd,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        registry: EventRegistry<ProtocolState>,
    }

    impl Harness {
        fn with_playback(playback: MockPlaybackSink) -> Self {
            let (connection, remote) = pair(PingReply::Pong);
            let (tx, events) = mpsc::unbounded_channel();
            let ctx = SessionContext {
                audio: Arc::new(AudioBuffer::new()),
                executor: Arc::new(builtin_executor()),
                playback: Arc::new(playback),
                events: Some(tx),
            };
            Self {
                state: ProtocolState::new(ctx, connection.sink),
                remote,
                events,
                registry: protocol_registry(),
            }
        }

        fn new() -> Self {
            Self::with_playback(MockPlaybackSink::new())
        }

        async fn feed(&mut self, value: Value) -> Dispatch {
            let event = InboundEvent::from_value(value).unwrap();
            self.registry.dispatch(&mut self.state, &event).await.unwrap()
        }

        fn sent(&mut self) -> Vec<Value> {
            self.remote
                .sent()
                .iter()
                .map(|e| serde_json::to_value(e).unwrap())
                .collect()
        }
    }

    fn function_call_item(name: &str, call_id: &str) -> Value {
        json!({
            "type": "response.output_item.added",
            "response_id": "resp_1",
            "output_index": 0,
            "item": {"id": "item_1", "type": "function_call", "name": name, "call_id": call_id}
        })
    }

    #[test]
    fn test_parse_arguments_fallbacks() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_arguments("{\"a\":"), json!({}));
        assert_eq!(parse_arguments("[1,2]"), json!({}));
    }

    #[tokio::test]
    async fn test_deltas_accumulate_in_order() {
        let mut h = Harness::new();
        h.feed(function_call_item("get_random_number", "call_9")).await;
        for delta in ["{\"lo", "w\": ", "1", "}"] {
            h.feed(json!({"type": "response.function_call_arguments.delta", "call_id": "call_9", "delta": delta}))
                .await;
        }
        let call = h.state.pending_call.as_ref().unwrap();
        assert_eq!(call.arguments, "{\"low\": 1}");
        assert_eq!(call.name, "get_random_number");
    }

    #[tokio::test]
    async fn test_orphan_delta_is_dropped() {
        let mut h = Harness::new();
        let outcome = h
            .feed(json!({"type": "response.function_call_arguments.delta", "delta": "{}"}))
            .await;
        assert_eq!(outcome, Dispatch::Handled);
        assert!(h.state.pending_call.is_none());

        h.feed(json!({"type": "response.function_call_arguments.done"}))
            .await;
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_current_time_call_sends_output_then_response_create() {
        let mut h = Harness::new();
        h.feed(function_call_item("get_current_time", "call_1")).await;
        h.feed(json!({"type": "response.function_call_arguments.done", "call_id": "call_1"}))
            .await;

        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["type"], "conversation.item.create");
        assert_eq!(sent[0]["item"]["type"], "function_call_output");
        assert_eq!(sent[0]["item"]["call_id"], "call_1");
        let output: Value =
            serde_json::from_str(sent[0]["item"]["output"].as_str().unwrap()).unwrap();
        assert!(output["current_time"].is_string());
        assert_eq!(sent[1], json!({"type": "response.create"}));
        assert!(h.state.pending_call.is_none());

        assert_eq!(
            h.events.try_recv().unwrap(),
            SessionEvent::FunctionCalled {
                name: "get_current_time".into(),
                error: None
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_function_reports_error_to_assistant() {
        let mut h = Harness::new();
        h.feed(function_call_item("launch_rockets", "call_2")).await;
        h.feed(json!({"type": "response.function_call_arguments.delta", "delta": "not json"}))
            .await;
        h.feed(json!({"type": "response.function_call_arguments.done"}))
            .await;

        let sent = h.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0]["item"]["role"], "assistant");
        assert_eq!(
            sent[0]["item"]["content"][0]["text"],
            "Function 'launch_rockets' not found."
        );
        assert_eq!(
            sent[1]["item"]["output"],
            json!({"error": "Function 'launch_rockets' not found."}).to_string()
        );
        assert_eq!(sent[2]["type"], "response.create");
    }

    #[tokio::test]
    async fn test_response_cycle_plays_audio_and_resets() {
        let mut playback = MockPlaybackSink::new();
        playback
            .expect_play()
            .withf(|pcm| pcm == &vec![1, 2, 3, 4])
            .times(1)
            .returning(|_| Ok(()));
        let mut h = Harness::with_playback(playback);
        h.state.ctx.audio.start_recording();

        h.feed(json!({"type": "response.created"})).await;
        assert_eq!(h.state.turn_state(), TurnState::AssistantResponding);
        assert!(h.state.response_in_progress);

        h.feed(json!({"type": "response.text.delta", "delta": "Hel"})).await;
        h.feed(json!({"type": "response.text.delta", "delta": "lo"})).await;
        h.feed(json!({"type": "response.audio.delta", "delta": STANDARD.encode([1u8, 2])}))
            .await;
        h.feed(json!({"type": "response.audio.delta", "delta": STANDARD.encode([3u8, 4])}))
            .await;
        assert_eq!(h.state.response.text, "Hello");

        h.feed(json!({"type": "response.done"})).await;
        assert!(h.state.response.is_empty());
        assert!(!h.state.ctx.audio.is_receiving());
        assert_eq!(h.state.turn_state(), TurnState::AwaitingRateLimit);

        h.feed(json!({"type": "rate_limits.updated", "rate_limits": []}))
            .await;
        assert!(!h.state.response_in_progress);
        assert_eq!(h.state.turn_state(), TurnState::UserSpeaking);

        let mut seen = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                SessionEvent::TextDelta("Hel".into()),
                SessionEvent::TextDelta("lo".into()),
                SessionEvent::ResponseCompleted {
                    text: "Hello".into(),
                    latency: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_response_done_without_audio_skips_playback() {
        let mut playback = MockPlaybackSink::new();
        playback.expect_play().never();
        let mut h = Harness::with_playback(playback);
        h.feed(json!({"type": "response.created"})).await;
        h.feed(json!({"type": "response.done"})).await;
        h.feed(json!({"type": "response.done"})).await;
        assert!(h.state.response.is_empty());
        assert!(!h.state.ctx.audio.is_receiving());
    }

    #[tokio::test]
    async fn test_playback_failure_still_ends_turn() {
        let mut playback = MockPlaybackSink::new();
        playback
            .expect_play()
            .returning(|_| Err(anyhow::anyhow!("device unplugged")));
        let mut h = Harness::with_playback(playback);
        h.feed(json!({"type": "response.created"})).await;
        h.feed(json!({"type": "response.audio.delta", "delta": STANDARD.encode([0u8, 0])}))
            .await;
        h.feed(json!({"type": "response.done"})).await;
        assert!(!h.state.ctx.audio.is_receiving());
    }

    #[tokio::test]
    async fn test_invalid_audio_delta_is_a_handler_error() {
        let mut h = Harness::new();
        let event =
            InboundEvent::from_value(json!({"type": "response.audio.delta", "delta": "***"}))
                .unwrap();
        assert!(h.registry.dispatch(&mut h.state, &event).await.is_err());
        assert!(h.state.response.audio_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_speech_stopped_commits_and_starts_clock() {
        let mut h = Harness::new();
        h.state.ctx.audio.start_recording();
        h.feed(json!({"type": "input_audio_buffer.speech_stopped", "audio_end_ms": 1200}))
            .await;

        assert!(!h.state.ctx.audio.is_recording());
        assert!(h.state.response.started_at.is_some());
        assert_eq!(h.sent(), vec![json!({"type": "input_audio_buffer.commit"})]);
    }

    #[tokio::test]
    async fn test_error_events() {
        let mut h = Harness::new();
        h.state.ctx.audio.start_recording();
        h.feed(json!({"type": "error", "error": {"message": "Error committing input audio buffer: buffer is empty."}}))
            .await;
        assert!(!h.state.response_in_progress);
        assert_eq!(h.state.turn_state(), TurnState::UserSpeaking);

        h.feed(json!({"type": "error", "error": {"message": "Conversation already has an active response"}}))
            .await;
        assert!(h.state.response_in_progress);

        let outcome = h
            .feed(json!({"type": "error", "error": {"message": "something else"}}))
            .await;
        assert_eq!(outcome, Dispatch::Handled);
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_tag_is_unhandled() {
        let mut h = Harness::new();
        let outcome = h.feed(json!({"type": "response.content_part.added"})).await;
        assert_eq!(outcome, Dispatch::Unhandled);
    }

    #[test]
    fn test_registry_covers_inbound_tags() {
        let registry = protocol_registry();
        for kind in [
            server_event::RESPONSE_CREATED,
            server_event::RESPONSE_OUTPUT_ITEM_ADDED,
            server_event::RESPONSE_FUNCTION_CALL_ARGUMENTS_DELTA,
            server_event::RESPONSE_FUNCTION_CALL_ARGUMENTS_DONE,
            server_event::RESPONSE_TEXT_DELTA,
            server_event::RESPONSE_AUDIO_DELTA,
            server_event::RESPONSE_DONE,
            server_event::ERROR,
            server_event::INPUT_AUDIO_BUFFER_SPEECH_STARTED,
            server_event::INPUT_AUDIO_BUFFER_SPEECH_STOPPED,
            server_event::RATE_LIMITS_UPDATED,
        ] {
            assert!(registry.contains(kind), "no handler for {kind}");
        }
        assert!(!registry.contains("response.content_part.added"));
    }
}
