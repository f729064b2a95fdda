//! Main entrypoint for the voicelink client.
//!
//! Loads configuration, wires the audio devices and the realtime connection
//! into a [`SessionProtocol`], and runs it until Ctrl+C or a fatal error.

use anyhow::Context;
use clap::Parser;
use openai_realtime::websocket::WebSocketConnector;
use std::{io, sync::Arc};
use tokio::sync::mpsc;
use tracing::{error, info};
use voicelink_core::{SessionContext, SessionProtocol, tools::builtin_executor};
use voicelink_service::{
    cli::Cli, config::Config, microphone::Microphone, speaker::Speaker, transcript::Transcript,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(io::stderr)
        .init();
    info!(model = %config.model, voice = ?config.voice, "Configuration loaded.");

    // --- 3. Wire the session ---
    let prompts = cli.prompt_list();
    let live = prompts.is_none();
    let session_config = config.session_config(prompts);

    let connector = Arc::new(WebSocketConnector::new(
        config.realtime_url,
        config.model,
        config.api_key,
    ));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let ctx = SessionContext::new(builtin_executor(), Arc::new(Speaker::new())).with_events(events_tx);

    let mut session = SessionProtocol::new(session_config, connector, ctx);
    if live {
        session = session.with_audio_input(Arc::new(Microphone::new()));
    }

    // --- 4. Shutdown and transcript tasks ---
    let exit = session.exit_flag();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C. Shutting down..."),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C; shutting down."),
        }
        exit.set();
    });

    let transcript = tokio::spawn(async move {
        let mut transcript = Transcript::new(io::stdout());
        while let Some(event) = events_rx.recv().await {
            if let Err(e) = transcript.handle(&event) {
                error!(error = %e, "Failed to write transcript.");
            }
        }
    });

    println!("Press Ctrl+C to exit the program.");

    // --- 5. Run ---
    let result = session.run().await;
    drop(session);
    let _ = transcript.await;
    result.context("Realtime session failed")?;
    info!("Goodbye.");
    Ok(())
}
