//! Language model completion
//!
//! The retrieval core never calls a model; the server composes retrieved
//! context into a prompt and hands it to a [`CompletionProvider`].

mod gemini;

pub use gemini::GeminiProvider;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("LLM is disabled in configuration")]
    Disabled,

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned no usable answer: {0}")]
    InvalidResponse(String),
}

/// A text completion backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt`, returning the model's answer
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Compose the tutoring prompt from retrieved context and the question
pub fn build_prompt(question: &str, contexts: &[String]) -> String {
    format!(
        "You are a helpful study tutor.\n\
         Use the context below to answer the question accurately.\n\
         Cite the sources if possible.\n\n\
         Context:\n{}\n\n\
         Question: {}\n",
        contexts.join("\n\n"),
        question
    )
}

/// Build the completion provider named in the LLM configuration
pub fn provider_from_config(
    config: &crate::config::LlmConfig,
) -> Result<std::sync::Arc<dyn CompletionProvider>, LlmError> {
    if !config.enabled {
        return Err(LlmError::Disabled);
    }

    match config.provider.as_str() {
        "gemini" => {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;
            let provider = GeminiProvider::new(
                &config.endpoint,
                &config.model,
                api_key,
                std::time::Duration::from_secs(config.timeout_secs),
            )?;
            Ok(std::sync::Arc::new(provider))
        }
        other => Err(LlmError::UnsupportedProvider(other.to_string())),
    }
}
