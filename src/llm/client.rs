//! LLM Client abstractions and provider management
//!
//! This module provides a unified interface for the two ways a reply can be
//! produced:
//! - **Ollama**: local inference through an Ollama server
//! - **OpenAI**: any OpenAI-compatible chat completions endpoint

use crate::types::{AppError, Result};
use crate::utils::toml_config::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-call sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 50,
            top_p: 0.95,
            max_tokens: 512,
        }
    }
}

impl From<&crate::utils::toml_config::GenerationConfig> for GenerationParams {
    fn from(config: &crate::utils::toml_config::GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// Generic LLM client trait for provider abstraction
///
/// Every request is packed as a fixed system message followed by one message
/// with the caller's role and content.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a complete reply
    async fn generate(&self, prompt: &str, role: &str, params: &GenerationParams)
        -> Result<String>;

    /// Stream a reply as text fragments
    async fn stream(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Message roles accepted by chat endpoints. Anything else is sent as `user`.
pub fn normalize_role(role: &str) -> &'static str {
    match role.to_ascii_lowercase().as_str() {
        "system" => "system",
        "assistant" => "assistant",
        _ => "user",
    }
}

/// Provider enum for runtime selection
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// OpenAI API provider (including compatible APIs such as DeepSeek)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "llama3.2".to_string(),
    /// };
    /// ```
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Resolve a provider from configuration, reading secrets from the environment.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        match config {
            ProviderConfig::Ollama { base_url, model } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
            }),
            ProviderConfig::OpenAI {
                api_key_env,
                api_base,
                model,
            } => {
                let api_key = std::env::var(api_key_env).map_err(|_| {
                    AppError::Configuration(format!(
                        "Environment variable '{}' is not set",
                        api_key_env
                    ))
                })?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model.clone(),
                })
            }
        }
    }

    /// Create a client instance for this provider
    pub async fn create_client(&self, system_prompt: &str) -> Result<Box<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Box::new(
                super::openai::OpenAIClient::new(api_key.clone(), api_base.clone(), model.clone())
                    .with_system_prompt(system_prompt),
            )),
            #[cfg(not(feature = "openai"))]
            Provider::OpenAI { .. } => Err(AppError::Configuration(
                "OpenAI provider requires the `openai` feature".to_string(),
            )),

            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Box::new(
                super::ollama::OllamaClient::new(base_url, model.clone())
                    .with_system_prompt(system_prompt),
            )),
            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { .. } => Err(AppError::Configuration(
                "Ollama provider requires the `ollama` feature".to_string(),
            )),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}
