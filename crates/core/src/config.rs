//! Session-level configuration, constructed once by the caller and passed to
//! [`SessionProtocol::new`](crate::session::SessionProtocol::new).

use crate::tools::builtin_catalog;
use openai_realtime::keepalive::{DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT};
use openai_realtime_types::{AudioFormat, Modality, Session, ToolDefinition, TurnDetection, Voice};
use std::time::Duration;

pub const DEFAULT_ASSISTANT_NAME: &str = "Jarvis";
pub const DEFAULT_USER_NAME: &str = "Chris";
pub const AUDIO_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Persona instructions for the assistant.
pub fn default_instructions(assistant_name: &str, user_name: &str) -> String {
    format!(
        "You are {assistant_name}, your role is to provide insightful and supportive responses \
         tailored to {user_name}'s needs. Maintain a helpful, informative approach. \
         Make sure to always keep your responses as concise and to the point as possible. \
         Never break character."
    )
}

/// Server-side voice-activity detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadSettings {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 700,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub instructions: Option<String>,
    pub voice: Voice,
    pub vad: VadSettings,
    pub tools: Vec<ToolDefinition>,
    /// Conversation starters sent instead of live microphone input.
    pub prompts: Option<Vec<String>>,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instructions: Some(default_instructions(
                DEFAULT_ASSISTANT_NAME,
                DEFAULT_USER_NAME,
            )),
            voice: Voice::default(),
            vad: VadSettings::default(),
            tools: builtin_catalog(),
            prompts: None,
            poll_interval: AUDIO_POLL_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn is_prompt_mode(&self) -> bool {
        self.prompts.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// The payload of the `session.update` event sent on every connection.
    pub fn session(&self) -> Session {
        Session {
            modalities: vec![Modality::Text, Modality::Audio],
            instructions: self.instructions.clone(),
            voice: self.voice,
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            turn_detection: TurnDetection::ServerVad {
                threshold: self.vad.threshold,
                prefix_padding_ms: self.vad.prefix_padding_ms,
                silence_duration_ms: self.vad.silence_duration_ms,
            },
            tools: self.tools.clone(),
        }
    }
}
