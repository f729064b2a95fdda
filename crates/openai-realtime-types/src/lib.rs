//! Wire types for the OpenAI Realtime API.
//!
//! Outbound events are a closed, serde-tagged enum. Inbound events are kept as a
//! tagged envelope so that unknown event types survive decoding and can be
//! routed (or ignored) by tag.

pub mod events;
pub mod item;
pub mod session;

pub use events::{ClientEvent, InboundDecodeError, InboundEvent, server_event};
pub use item::{ContentType, Item, ItemContent, ItemRole, ItemType};
pub use session::{
    AudioFormat, Modality, Session, ToolDefinition, ToolType, TurnDetection, UnknownVoice, Voice,
};
