//! Core engine of the realtime voice client.
//!
//! [`SessionProtocol`] owns the connection lifecycle and turn-taking;
//! everything device- or process-specific reaches it through the
//! [`AudioInput`] and [`PlaybackSink`] traits and an explicit
//! [`SessionConfig`].

pub mod audio_buffer;
pub mod capture;
pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod playback;
pub mod session;
pub mod state;
pub mod tools;

pub use audio_buffer::AudioBuffer;
pub use capture::{ActiveCapture, AudioInput};
pub use config::{SessionConfig, VadSettings};
pub use error::SessionError;
pub use executor::{FunctionExecutor, FunctionResult};
pub use playback::PlaybackSink;
pub use session::{ExitFlag, SessionProtocol};
pub use state::{ConnectionState, SessionContext, SessionEvent, TurnState};
