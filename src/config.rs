//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// LINE rejects text messages longer than this many characters.
pub const LINE_MAX_MESSAGE_CHARS: usize = 5000;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Secret the field-encryption key is derived from. Required.
    pub encryption_key: SecretString,
    pub llm_backend: LlmBackend,
    /// Generation provider credentials. Absent means every fortune request
    /// falls back to the fixed apology message.
    pub llm_api_key: Option<SecretString>,
    pub model: String,
    /// LINE channel secret used to verify webhook signatures.
    pub line_channel_secret: Option<SecretString>,
    /// LINE channel access token used for reply/push calls.
    pub line_access_token: Option<SecretString>,
    pub db_path: PathBuf,
    pub port: u16,
    /// Upper bound on events being handled at the same time.
    pub max_in_flight: usize,
    pub queue_capacity: usize,
    /// Per-message character bound for outbound segments.
    pub max_message_chars: usize,
    /// Directory for the daily-rotated log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let encryption_key = get("FORTUNE_ENCRYPTION_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("FORTUNE_ENCRYPTION_KEY".to_string()))?;

        let llm_backend: LlmBackend =
            parse_or("FORTUNE_LLM_BACKEND", get("FORTUNE_LLM_BACKEND"), LlmBackend::OpenAi)?;
        let key_var = match llm_backend {
            LlmBackend::OpenAi => "OPENAI_API_KEY",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        };

        Ok(Self {
            encryption_key,
            llm_backend,
            llm_api_key: get(key_var).map(SecretString::from),
            model: get("FORTUNE_MODEL").unwrap_or_else(|| llm_backend.default_model().to_string()),
            line_channel_secret: get("LINE_CHANNEL_SECRET").map(SecretString::from),
            line_access_token: get("LINE_CHANNEL_ACCESS_TOKEN").map(SecretString::from),
            db_path: get("FORTUNE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/fortune-bot.db")),
            port: parse_or("FORTUNE_PORT", get("FORTUNE_PORT"), 5000)?,
            max_in_flight: parse_or("FORTUNE_MAX_IN_FLIGHT", get("FORTUNE_MAX_IN_FLIGHT"), 64)?
                .max(1),
            queue_capacity: parse_or("FORTUNE_QUEUE_CAPACITY", get("FORTUNE_QUEUE_CAPACITY"), 256)?
                .max(1),
            max_message_chars: parse_or(
                "FORTUNE_MAX_MESSAGE_CHARS",
                get("FORTUNE_MAX_MESSAGE_CHARS"),
                LINE_MAX_MESSAGE_CHARS,
            )?
            .clamp(1, LINE_MAX_MESSAGE_CHARS),
            log_dir: get("FORTUNE_LOG_DIR").map(PathBuf::from),
        })
    }

    /// LINE channel secret and access token, both required to serve traffic.
    pub fn line_credentials(&self) -> Result<(&SecretString, &SecretString), ConfigError> {
        let secret = self
            .line_channel_secret
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("LINE_CHANNEL_SECRET".to_string()))?;
        let token = self
            .line_access_token
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("LINE_CHANNEL_ACCESS_TOKEN".to_string()))?;
        Ok((secret, token))
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{value:?}: {e}"),
            }),
    }
}
