//! Generator for OpenAI and OpenAI-compatible backends.
//!
//! Groq exposes an OpenAI-compatible endpoint, so both backends share this
//! driver and differ only in API base and key.

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;

use crate::errors::ProviderFailure;
use crate::prelude::*;

use super::Generator;

/// Groq's OpenAI-compatible API base.
const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Driver for OpenAI-compatible chat completion APIs.
#[derive(Debug)]
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
}

impl OpenAiGenerator {
    /// Create a driver for OpenAI itself. `OPENAI_API_BASE` may override
    /// the server URL, which also makes LiteLLM and Ollama work.
    pub fn openai(api_key: &str) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
            config = config.with_api_base(api_base);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    /// Create a driver for Groq.
    pub fn groq(api_key: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(GROQ_API_BASE);
        Self {
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    #[instrument(level = "debug", skip_all, fields(model = %model))]
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, ProviderFailure> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(map_openai_error)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![message.into()])
            .max_completion_tokens(max_tokens)
            .build()
            .map_err(map_openai_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;
        trace!(?response, "chat completion response");

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(content)
    }
}

/// Normalize [`OpenAIError`] into our failure taxonomy.
fn map_openai_error(err: OpenAIError) -> ProviderFailure {
    match err {
        OpenAIError::ApiError(api) => {
            let message = api.message;
            if message.to_lowercase().contains("api key") {
                ProviderFailure::Auth
            } else {
                ProviderFailure::Api(message)
            }
        }
        OpenAIError::JSONDeserialize(err) => ProviderFailure::Malformed(err.to_string()),
        OpenAIError::Reqwest(err) if err.is_timeout() => ProviderFailure::Timeout,
        other => ProviderFailure::Api(other.to_string()),
    }
}
