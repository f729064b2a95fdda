//! Connection lifecycle for one realtime voice session.
//!
//! A [`SessionProtocol`] connects, configures the remote session, and then
//! runs a single `select!` loop that interleaves inbound dispatch, the
//! outbound audio poll and keep-alive pings. Losing the connection to a
//! keep-alive timeout reconnects after a short delay with fresh per-connection
//! state; every other failure ends the run.

use crate::{
    capture::{ActiveCapture, AudioInput},
    config::SessionConfig,
    error::SessionError,
    handlers::protocol_registry,
    state::{ConnectionState, ProtocolState, SessionContext, SessionEvent},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use openai_realtime::{
    Connection, ConnectionError, Connector, EventRegistry, EventStream, InboundFrame, KeepAlive,
    diagnostics::{Direction, log_ws_event},
};
use openai_realtime_types::{ClientEvent, InboundDecodeError, InboundEvent, Item};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{error, info, warn};

/// Shared shutdown request. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct ExitFlag(Arc<AtomicBool>);

impl ExitFlag {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SessionProtocol {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    ctx: SessionContext,
    input: Option<Arc<dyn AudioInput>>,
    registry: EventRegistry<ProtocolState>,
    exit: ExitFlag,
    state: ConnectionState,
}

impl SessionProtocol {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>, ctx: SessionContext) -> Self {
        let unresolved = ctx.executor.unresolved(&config.tools);
        if !unresolved.is_empty() {
            warn!(tools = ?unresolved, "Declared tools have no local function.");
        }
        let undeclared = ctx.executor.undeclared(&config.tools);
        if !undeclared.is_empty() {
            warn!(functions = ?undeclared, "Local functions are not announced to the agent.");
        }

        Self {
            config,
            connector,
            ctx,
            input: None,
            registry: protocol_registry(),
            exit: ExitFlag::default(),
            state: ConnectionState::Disconnected,
        }
    }

    /// Live microphone input. Ignored in prompt mode.
    pub fn with_audio_input(mut self, input: Arc<dyn AudioInput>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn exit_flag(&self) -> ExitFlag {
        self.exit.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "Connection state changed.");
            self.state = state;
            self.ctx.notify(SessionEvent::Connection(state));
        }
    }

    /// Runs until the exit flag is set or the connection fails for good.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let result = self.run_inner().await;
        self.set_state(ConnectionState::Disconnected);
        if let Err(e) = &result {
            error!(error = %e, "Session terminated.");
        }
        result
    }

    async fn run_inner(&mut self) -> Result<(), SessionError> {
        loop {
            if self.exit.is_set() {
                return Ok(());
            }
            self.set_state(ConnectionState::Connecting);
            let outcome = match self.connector.connect().await {
                Ok(connection) => self.run_connection(connection).await,
                Err(e) => Err(e.into()),
            };
            match outcome {
                Err(e) if e.is_transient() => {
                    warn!(error = %e, delay = ?self.config.reconnect_delay, "Connection lost; reconnecting.");
                    self.set_state(ConnectionState::Reconnecting);
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
                other => return other,
            }
        }
    }

    /// Drives one connection and always tears it down afterwards.
    async fn run_connection(&mut self, connection: Connection) -> Result<(), SessionError> {
        let Connection { sink, mut stream } = connection;
        self.ctx.audio.reset();
        let mut state = ProtocolState::new(self.ctx.clone(), sink);
        let mut capture: Option<Box<dyn ActiveCapture>> = None;

        let result = self
            .drive(&mut state, stream.as_mut(), &mut capture)
            .await;

        self.set_state(ConnectionState::Closing);
        self.ctx.audio.stop_recording();
        if let Some(mut capture) = capture.take() {
            capture.close();
        }
        if let Err(e) = state.outbound.close().await {
            warn!(error = %e, "Failed to close connection cleanly.");
        }
        result
    }

    async fn drive(
        &mut self,
        state: &mut ProtocolState,
        stream: &mut dyn EventStream,
        capture: &mut Option<Box<dyn ActiveCapture>>,
    ) -> Result<(), SessionError> {
        self.set_state(ConnectionState::Configuring);
        state
            .outbound
            .send(ClientEvent::session_update(self.config.session()))
            .await?;

        let live = if self.config.is_prompt_mode() {
            let prompts = self.config.prompts.as_deref().unwrap_or_default();
            info!(count = prompts.len(), "Sending initial prompts.");
            state
                .outbound
                .send(ClientEvent::create_item(Item::user_text(prompts)))
                .await?;
            state.outbound.send(ClientEvent::create_response()).await?;
            false
        } else {
            if let Some(input) = &self.input {
                let active = input
                    .open(Arc::clone(&self.ctx.audio))
                    .map_err(SessionError::Device)?;
                *capture = Some(active);
            }
            self.ctx.audio.start_recording();
            true
        };

        self.set_state(ConnectionState::Active);
        self.active_loop(state, stream, live).await
    }

    async fn active_loop(
        &self,
        state: &mut ProtocolState,
        stream: &mut dyn EventStream,
        live: bool,
    ) -> Result<(), SessionError> {
        let mut keepalive = KeepAlive::new(self.config.ping_interval, self.config.ping_timeout);
        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ping = interval_at(Instant::now() + keepalive.interval(), keepalive.interval());
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut turn = state.turn_state();
        self.ctx.notify(SessionEvent::Turn(turn));

        loop {
            tokio::select! {
                // Frames first: a pong queued behind a long handler must be
                // seen before the keep-alive deadline is checked.
                biased;

                frame = stream.next_frame() => match frame {
                    None => return Err(ConnectionError::closed(None).into()),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(InboundFrame::Pong)) => keepalive.pong_received(),
                    Some(Ok(InboundFrame::Close(reason))) => {
                        return Err(ConnectionError::closed(reason).into());
                    }
                    Some(Ok(InboundFrame::Text(text))) => match InboundEvent::parse(&text) {
                        Ok(event) => {
                            log_ws_event(Direction::Incoming, event.kind());
                            if let Err(e) = self.registry.dispatch(state, &event).await {
                                error!(kind = event.kind(), error = ?e, "Event handler failed.");
                            }
                        }
                        Err(InboundDecodeError::MissingType) => {
                            warn!(frame = %text, "Unhandled event type: None");
                        }
                        Err(e) => return Err(e.into()),
                    },
                },
                _ = poll.tick() => {
                    if self.exit.is_set() {
                        info!("Exit requested; closing session.");
                        return Ok(());
                    }
                    keepalive.check(Instant::now())?;
                    if live && !self.ctx.audio.is_receiving() {
                        if let Some(chunk) = self.ctx.audio.drain() {
                            state
                                .outbound
                                .send(ClientEvent::append_audio(STANDARD.encode(chunk)))
                                .await?;
                        }
                    }
                },
                _ = ping.tick() => {
                    state.outbound.ping().await?;
                    keepalive.ping_sent(Instant::now());
                },
            }

            let current = state.turn_state();
            if current != turn {
                turn = current;
                self.ctx.notify(SessionEvent::Turn(turn));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        playback::{MockPlaybackSink, PlaybackSink},
        state::TurnState,
        tools::builtin_executor,
    };
    use openai_realtime::memory::{MemoryConnector, PingReply};
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeMicrophone {
        frames: Vec<Vec<u8>>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    struct FakeCapture {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ActiveCapture for FakeCapture {
        fn close(&mut self) {
            self.log.lock().unwrap().push("close");
        }
    }

    impl AudioInput for FakeMicrophone {
        fn open(
            &self,
            buffer: Arc<crate::audio_buffer::AudioBuffer>,
        ) -> anyhow::Result<Box<dyn ActiveCapture>> {
            self.log.lock().unwrap().push("open");
            // Frames pushed before recording starts must be discarded.
            for frame in &self.frames {
                buffer.push(frame);
            }
            Ok(Box::new(FakeCapture {
                log: Arc::clone(&self.log),
            }))
        }
    }

    struct BrokenMicrophone;

    impl AudioInput for BrokenMicrophone {
        fn open(
            &self,
            _buffer: Arc<crate::audio_buffer::AudioBuffer>,
        ) -> anyhow::Result<Box<dyn ActiveCapture>> {
            anyhow::bail!("no input device")
        }
    }

    fn build(
        config: SessionConfig,
        connector: Arc<MemoryConnector>,
    ) -> (SessionProtocol, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(builtin_executor(), Arc::new(MockPlaybackSink::new()))
            .with_events(tx);
        (SessionProtocol::new(config, connector, ctx), rx)
    }

    fn to_json(event: &ClientEvent) -> Value {
        serde_json::to_value(event).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_configures_then_streams_captured_audio() {
        let connector = Arc::new(MemoryConnector::new());
        let mut remote = connector.prepare(PingReply::Pong);
        let (protocol, _events) = build(SessionConfig::default(), connector.clone());
        let mut protocol = protocol.with_audio_input(Arc::new(FakeMicrophone {
            frames: vec![vec![9, 9]],
            ..Default::default()
        }));
        let exit = protocol.exit_flag();
        let audio = Arc::clone(&protocol.ctx.audio);
        let task = tokio::spawn(async move { protocol.run().await });

        let first = remote.next_sent().await.unwrap();
        assert_eq!(first.kind(), "session.update");
        assert_eq!(to_json(&first)["session"]["voice"], "echo");

        audio.push(&[1, 0, 2, 0]);
        let append = remote.next_sent().await.unwrap();
        assert_eq!(
            to_json(&append),
            json!({"type": "input_audio_buffer.append", "audio": STANDARD.encode([1u8, 0, 2, 0])})
        );

        exit.set();
        assert!(task.await.unwrap().is_ok());
        assert!(remote.was_closed());
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_audio_sent_while_assistant_responds() {
        let connector = Arc::new(MemoryConnector::new());
        let mut remote = connector.prepare(PingReply::Pong);
        let (mut protocol, mut events) = build(SessionConfig::default(), connector);
        let exit = protocol.exit_flag();
        let audio = Arc::clone(&protocol.ctx.audio);
        let task = tokio::spawn(async move { protocol.run().await });

        assert_eq!(remote.next_sent().await.unwrap().kind(), "session.update");
        remote.push_json(json!({"type": "response.created"}));
        loop {
            if let Some(SessionEvent::Turn(TurnState::AssistantResponding)) = events.recv().await {
                break;
            }
        }
        assert!(!audio.push(&[1, 2]));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(remote.sent().is_empty());

        exit.set();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_mode_sends_prompts_without_microphone() {
        let connector = Arc::new(MemoryConnector::new());
        let mut remote = connector.prepare(PingReply::Pong);
        let config = SessionConfig {
            prompts: Some(vec!["hello".into(), "what time is it?".into()]),
            ..Default::default()
        };
        let log = Arc::new(Mutex::new(Vec::new()));
        let (protocol, _events) = build(config, connector);
        let mut protocol = protocol.with_audio_input(Arc::new(FakeMicrophone {
            frames: vec![],
            log: Arc::clone(&log),
        }));
        let exit = protocol.exit_flag();
        let task = tokio::spawn(async move { protocol.run().await });

        assert_eq!(remote.next_sent().await.unwrap().kind(), "session.update");
        let item = to_json(&remote.next_sent().await.unwrap());
        assert_eq!(item["item"]["role"], "user");
        assert_eq!(item["item"]["content"][1]["text"], "what time is it?");
        assert_eq!(remote.next_sent().await.unwrap().kind(), "response.create");

        exit.set();
        task.await.unwrap().unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_closed_on_fatal_close() {
        let connector = Arc::new(MemoryConnector::new());
        let remote = connector.prepare(PingReply::Pong);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (protocol, _events) = build(SessionConfig::default(), connector.clone());
        let mut protocol = protocol.with_audio_input(Arc::new(FakeMicrophone {
            frames: vec![],
            log: Arc::clone(&log),
        }));

        remote.push_frame(InboundFrame::Close(Some("going away".into())));
        let err = protocol.run().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Connection(ConnectionError::Closed { .. })
        ));
        assert_eq!(*log.lock().unwrap(), vec!["open", "close"]);
        assert_eq!(protocol.connection_state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_is_fatal() {
        let connector = Arc::new(MemoryConnector::new());
        let remote = connector.prepare(PingReply::Pong);
        let (mut protocol, _events) = build(SessionConfig::default(), connector);

        remote.push_frame(InboundFrame::Text("{not json".into()));
        assert!(matches!(
            protocol.run().await,
            Err(SessionError::Decode(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connection_is_not_retried() {
        let connector = Arc::new(MemoryConnector::new());
        let (mut protocol, _events) = build(SessionConfig::default(), connector.clone());
        assert!(matches!(
            protocol.run().await,
            Err(SessionError::Connection(ConnectionError::Refused(_)))
        ));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_failure_is_fatal() {
        let connector = Arc::new(MemoryConnector::new());
        let mut remote = connector.prepare(PingReply::Pong);
        let (protocol, _events) = build(SessionConfig::default(), connector);
        let mut protocol = protocol.with_audio_input(Arc::new(BrokenMicrophone));

        assert!(matches!(
            protocol.run().await,
            Err(SessionError::Device(_))
        ));
        assert!(remote.was_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_failure_keeps_session_alive() {
        let connector = Arc::new(MemoryConnector::new());
        let mut remote = connector.prepare(PingReply::Pong);
        let (mut protocol, _events) = build(SessionConfig::default(), connector);
        let exit = protocol.exit_flag();
        let task = tokio::spawn(async move { protocol.run().await });

        assert_eq!(remote.next_sent().await.unwrap().kind(), "session.update");
        remote.push_json(json!({"type": "response.audio.delta", "delta": "***"}));
        remote.push_json(json!({"type": "input_audio_buffer.speech_stopped"}));
        assert_eq!(
            remote.next_sent().await.unwrap().kind(),
            "input_audio_buffer.commit"
        );

        exit.set();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_without_type_is_tolerated() {
        let connector = Arc::new(MemoryConnector::new());
        let mut remote = connector.prepare(PingReply::Pong);
        let (mut protocol, _events) = build(SessionConfig::default(), connector.clone());
        let exit = protocol.exit_flag();
        let task = tokio::spawn(async move { protocol.run().await });

        assert_eq!(remote.next_sent().await.unwrap().kind(), "session.update");
        remote.push_json(json!({"event_id": "evt_1", "delta": "x"}));
        tokio::time::sleep(Duration::from_secs(1)).await;
        remote.push_json(json!({"type": "input_audio_buffer.speech_stopped"}));
        assert_eq!(
            remote.next_sent().await.unwrap().kind(),
            "input_audio_buffer.commit"
        );

        exit.set();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_fatal() {
        let connector = Arc::new(MemoryConnector::new());
        let remote = connector.prepare(PingReply::Pong);
        let (mut protocol, _events) = build(SessionConfig::default(), connector.clone());

        remote.push_error(ConnectionError::Refused("reset by peer".into()));
        assert!(matches!(
            protocol.run().await,
            Err(SessionError::Connection(ConnectionError::Refused(_)))
        ));
        assert_eq!(connector.attempts(), 1);
    }

    /// Takes a while to play, like a real device.
    struct SlowPlayback(Duration);

    #[async_trait::async_trait]
    impl PlaybackSink for SlowPlayback {
        async fn play(&self, _pcm: Vec<u8>) -> anyhow::Result<()> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_queued_behind_playback_keeps_connection() {
        for _ in 0..20 {
            let connector = Arc::new(MemoryConnector::new());
            // The test answers the ping itself, after the response frames.
            let mut remote = connector.prepare(PingReply::Silent);
            let config = SessionConfig {
                ping_interval: Duration::from_secs(5),
                ping_timeout: Duration::from_secs(2),
                ..Default::default()
            };
            let ctx = SessionContext::new(
                builtin_executor(),
                Arc::new(SlowPlayback(Duration::from_secs(5))),
            );
            let mut protocol = SessionProtocol::new(config, connector.clone(), ctx);
            let exit = protocol.exit_flag();
            let task = tokio::spawn(async move { protocol.run().await });

            assert_eq!(remote.next_sent().await.unwrap().kind(), "session.update");
            // Just past the first ping.
            tokio::time::sleep(Duration::from_millis(5050)).await;
            remote.push_json(json!({"type": "response.created"}));
            remote.push_json(json!({"type": "response.audio.delta", "delta": STANDARD.encode([0u8, 0])}));
            remote.push_json(json!({"type": "response.done"}));
            remote.push_frame(InboundFrame::Pong);

            // Playback ends well past the ping deadline.
            tokio::time::sleep(Duration::from_secs(6)).await;
            exit.set();
            assert!(task.await.unwrap().is_ok());
            assert_eq!(connector.attempts(), 1);
        }
    }
}
