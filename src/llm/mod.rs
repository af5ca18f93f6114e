//! LLM integration for fortune generation.
//!
//! Supports:
//! - **OpenAI**: Direct API access via rig-core (default)
//! - **Anthropic**: Direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `CompletionModel` trait to our `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unknown LLM backend '{other}'")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    /// `None` yields an [`UnconfiguredProvider`].
    pub api_key: Option<secrecy::SecretString>,
    pub model: String,
}

/// Create an LLM provider from configuration.
///
/// A missing API key is not an error here: the returned provider fails every
/// call with `AuthFailed`, and fortune requests receive the fallback reply.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let Some(api_key) = config.api_key.as_ref() else {
        tracing::warn!(
            "No API key configured for {}; fortune requests will use the fallback reply",
            config.backend
        );
        return Ok(Arc::new(UnconfiguredProvider::new(
            config.backend.name(),
            config.model.clone(),
        )));
    };
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(api_key, &config.model),
        LlmBackend::OpenAi => create_openai_provider(api_key, &config.model),
    }
}

fn create_anthropic_provider(
    api_key: &secrecy::SecretString,
    model_name: &str,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(api_key.expose_secret()).map_err(|e| LlmError::RequestFailed {
            provider: "anthropic".to_string(),
            reason: format!("Failed to create Anthropic client: {}", e),
        })?;

    let model = client.completion_model(model_name);
    tracing::info!("Using Anthropic (model: {})", model_name);
    Ok(Arc::new(RigAdapter::new(model, model_name, "anthropic")))
}

fn create_openai_provider(
    api_key: &secrecy::SecretString,
    model_name: &str,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(api_key.expose_secret()).map_err(|e| LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: format!("Failed to create OpenAI client: {}", e),
        })?;

    let model = client.completion_model(model_name);
    tracing::info!("Using OpenAI (model: {})", model_name);
    Ok(Arc::new(RigAdapter::new(model, model_name, "openai")))
}
