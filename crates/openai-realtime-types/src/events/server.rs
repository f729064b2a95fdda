use crate::item::Item;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Wire tags of the events the realtime agent sends.
pub mod server_event {
    pub const ERROR: &str = "error";
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_UPDATED: &str = "session.updated";
    pub const INPUT_AUDIO_BUFFER_SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
    pub const INPUT_AUDIO_BUFFER_SPEECH_STOPPED: &str = "input_audio_buffer.speech_stopped";
    pub const INPUT_AUDIO_BUFFER_COMMITTED: &str = "input_audio_buffer.committed";
    pub const CONVERSATION_ITEM_CREATED: &str = "conversation.item.created";
    pub const RESPONSE_CREATED: &str = "response.created";
    pub const RESPONSE_DONE: &str = "response.done";
    pub const RESPONSE_OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
    pub const RESPONSE_OUTPUT_ITEM_DONE: &str = "response.output_item.done";
    pub const RESPONSE_TEXT_DELTA: &str = "response.text.delta";
    pub const RESPONSE_TEXT_DONE: &str = "response.text.done";
    pub const RESPONSE_AUDIO_DELTA: &str = "response.audio.delta";
    pub const RESPONSE_AUDIO_DONE: &str = "response.audio.done";
    pub const RESPONSE_FUNCTION_CALL_ARGUMENTS_DELTA: &str =
        "response.function_call_arguments.delta";
    pub const RESPONSE_FUNCTION_CALL_ARGUMENTS_DONE: &str = "response.function_call_arguments.done";
    pub const RATE_LIMITS_UPDATED: &str = "rate_limits.updated";
}

/// An inbound event kept as its `type` tag plus the full JSON payload.
///
/// Decoding never fails on an unknown tag; only frames that are not JSON
/// objects with a string `type` field are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    kind: String,
    payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum InboundDecodeError {
    #[error("inbound frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("inbound frame has no string `type` field")]
    MissingType,
}

impl InboundEvent {
    pub fn parse(text: &str) -> Result<Self, InboundDecodeError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(payload: Value) -> Result<Self, InboundDecodeError> {
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or(InboundDecodeError::MissingType)?
            .to_string();
        Ok(Self { kind, payload })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Decodes the payload into the typed body for this event's tag.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorDetails {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorEvent {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseOutputItemAddedEvent {
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub output_index: Option<u32>,
    pub item: Item,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseFunctionCallArgumentsDeltaEvent {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub delta: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseFunctionCallArgumentsDoneEvent {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseTextDeltaEvent {
    #[serde(default)]
    pub delta: String,
}

/// `delta` is base64 encoded PCM16.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseAudioDeltaEvent {
    pub delta: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputAudioBufferSpeechEvent {
    #[serde(default)]
    pub audio_start_ms: Option<u64>,
    #[serde(default)]
    pub audio_end_ms: Option<u64>,
    #[serde(default)]
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimit {
    pub name: String,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub remaining: Option<u64>,
    #[serde(default)]
    pub reset_seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitsUpdatedEvent {
    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,
}
