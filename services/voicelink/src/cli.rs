use clap::Parser;

/// Realtime voice assistant over the OpenAI Realtime API.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Conversation starters separated by '|'. When given, the microphone is
    /// not used and the prompts are sent as the first user message.
    #[arg(long)]
    pub prompts: Option<String>,
}

impl Cli {
    /// The prompt list, or `None` for live microphone input.
    pub fn prompt_list(&self) -> Option<Vec<String>> {
        let prompts: Vec<String> = self
            .prompts
            .as_deref()?
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        (!prompts.is_empty()).then_some(prompts)
    }
}
