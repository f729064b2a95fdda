use openai_realtime::websocket::{DEFAULT_MODEL, DEFAULT_REALTIME_URL};
use openai_realtime_types::Voice;
use secrecy::SecretString;
use std::{env, str::FromStr};
use tracing::Level;
use voicelink_core::{
    SessionConfig, VadSettings,
    config::{DEFAULT_ASSISTANT_NAME, DEFAULT_USER_NAME, default_instructions},
};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub model: String,
    pub realtime_url: String,
    pub voice: Voice,
    pub assistant_name: String,
    pub user_name: String,
    pub instructions: String,
    pub vad: VadSettings,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parses an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let model = var_or("REALTIME_MODEL", DEFAULT_MODEL);
        let realtime_url = var_or("REALTIME_URL", DEFAULT_REALTIME_URL);
        let voice = parse_var("REALTIME_VOICE", Voice::default())?;

        let assistant_name = var_or("ASSISTANT_NAME", DEFAULT_ASSISTANT_NAME);
        let user_name = var_or("USER_NAME", DEFAULT_USER_NAME);
        let instructions = env::var("ASSISTANT_INSTRUCTIONS")
            .unwrap_or_else(|_| default_instructions(&assistant_name, &user_name));

        let defaults = VadSettings::default();
        let vad = VadSettings {
            threshold: parse_var("VAD_THRESHOLD", defaults.threshold)?,
            prefix_padding_ms: parse_var("VAD_PREFIX_PADDING_MS", defaults.prefix_padding_ms)?,
            silence_duration_ms: parse_var(
                "VAD_SILENCE_DURATION_MS",
                defaults.silence_duration_ms,
            )?,
        };
        if !(0.0..=1.0).contains(&vad.threshold) {
            return Err(ConfigError::InvalidValue(
                "VAD_THRESHOLD".to_string(),
                format!("{} is outside 0.0..=1.0", vad.threshold),
            ));
        }

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_key,
            model,
            realtime_url,
            voice,
            assistant_name,
            user_name,
            instructions,
            vad,
            log_level,
        })
    }

    /// The core session configuration, in prompt mode when `prompts` is set.
    pub fn session_config(&self, prompts: Option<Vec<String>>) -> SessionConfig {
        SessionConfig {
            instructions: Some(self.instructions.clone()),
            voice: self.voice,
            vad: self.vad,
            prompts,
            ..SessionConfig::default()
        }
    }
}
