//! Per-event log lines for traffic on the realtime connection.

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    fn arrow(self) -> &'static str {
        match self {
            Direction::Incoming => "⬇️",
            Direction::Outgoing => "⬆️",
        }
    }
}

/// Glyph shown next to an event tag in the log.
pub fn event_glyph(kind: &str) -> &'static str {
    match kind {
        "session.update" => "🛠️",
        "session.created" => "🔌",
        "session.updated" => "🔄",
        "input_audio_buffer.append" => "🎤",
        "input_audio_buffer.commit" => "✅",
        "input_audio_buffer.committed" => "📥",
        "input_audio_buffer.speech_started" => "🗣️",
        "input_audio_buffer.speech_stopped" => "🤫",
        "conversation.item.create" => "📝",
        "conversation.item.created" => "📋",
        "response.create" => "➡️",
        "response.created" => "🆕",
        "response.output_item.added" => "➕",
        "response.output_item.done" => "✔️",
        "response.text.delta" => "✍️",
        "response.text.done" => "📄",
        "response.audio.delta" => "🔊",
        "response.audio.done" => "🔇",
        "response.function_call_arguments.delta" => "⚙️",
        "response.function_call_arguments.done" => "🔧",
        "response.done" => "🏁",
        "rate_limits.updated" => "⏳",
        "error" => "❌",
        _ => "❓",
    }
}

/// Logs one event crossing the connection. Audio chunks are high volume and
/// only show up at debug level.
pub fn log_ws_event(direction: Direction, kind: &str) {
    let glyph = event_glyph(kind);
    match kind {
        "input_audio_buffer.append" | "response.audio.delta" => {
            debug!("{} {glyph} {kind}", direction.arrow())
        }
        _ => info!("{} {glyph} {kind}", direction.arrow()),
    }
}

/// Logs how long an operation took, in seconds with two decimals.
pub fn log_runtime(operation: &str, elapsed: std::time::Duration) {
    info!(
        operation,
        "⏱️ {operation} took {:.2} seconds",
        elapsed.as_secs_f64()
    );
}
