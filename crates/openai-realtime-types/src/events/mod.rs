pub mod client;
pub mod server;

pub use client::*;
pub use server::{InboundDecodeError, InboundEvent, server_event};

use crate::{item::Item, session::Session};
use serde::{Deserialize, Serialize};

/// Events sent from the client to the realtime agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(SessionUpdateEvent),
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend(InputAudioBufferAppendEvent),
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit(InputAudioBufferCommitEvent),
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

impl ClientEvent {
    pub fn session_update(session: Session) -> Self {
        ClientEvent::SessionUpdate(SessionUpdateEvent {
            event_id: None,
            session,
        })
    }

    /// `audio` is already base64 encoded.
    pub fn append_audio(audio: String) -> Self {
        ClientEvent::InputAudioBufferAppend(InputAudioBufferAppendEvent {
            event_id: None,
            audio,
        })
    }

    pub fn commit_audio() -> Self {
        ClientEvent::InputAudioBufferCommit(InputAudioBufferCommitEvent::default())
    }

    pub fn create_item(item: Item) -> Self {
        ClientEvent::ConversationItemCreate(ConversationItemCreateEvent {
            event_id: None,
            previous_item_id: None,
            item,
        })
    }

    pub fn create_response() -> Self {
        ClientEvent::ResponseCreate(ResponseCreateEvent::default())
    }

    /// The wire `type` tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate(_) => "session.update",
            ClientEvent::InputAudioBufferAppend(_) => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit(_) => "input_audio_buffer.commit",
            ClientEvent::ConversationItemCreate(_) => "conversation.item.create",
            ClientEvent::ResponseCreate(_) => "response.create",
        }
    }
}
