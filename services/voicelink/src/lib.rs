//! Process surface of the voicelink client: configuration, command line,
//! audio devices and the user-facing transcript. The `voicelink` binary wires
//! these around [`voicelink_core::SessionProtocol`].

pub mod audio_utils;
pub mod cli;
pub mod config;
pub mod microphone;
pub mod speaker;
pub mod transcript;
