//! Answer-generation backends.
//!
//! One driver per backend family, behind a single [`Generator`] trait. The
//! [`Dispatcher`] normalizes inputs (one prompt string, a bounded output
//! hint) and outputs (plain text) so the lifecycle controller never cares
//! which backend it is talking to.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Args;
use tokio::time;

use crate::config::Credentials;
use crate::errors::{AnswerError, ProviderFailure};
use crate::prelude::*;
use crate::registry::{BackendKind, ProviderDescriptor};

pub mod gemini;
pub mod openai;

use self::gemini::GeminiGenerator;
use self::openai::OpenAiGenerator;

/// Options shared by all provider calls.
#[derive(Args, Clone, Debug)]
pub struct DispatchOpts {
    /// A timeout, in seconds, for a provider to return a complete
    /// response. A stuck backend must never hang a user's session.
    #[clap(long, default_value_t = 60)]
    pub timeout: u64,

    /// An upper limit on the number of completion tokens to generate.
    #[clap(long, default_value_t = 1000)]
    pub max_completion_tokens: u32,
}

impl Default for DispatchOpts {
    fn default() -> Self {
        Self {
            timeout: 60,
            max_completion_tokens: 1000,
        }
    }
}

/// Interface trait for answer-generation backends.
#[async_trait]
pub trait Generator: fmt::Debug + Send + Sync + 'static {
    /// Generate an answer to `prompt` using `model`.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, ProviderFailure>;
}

/// Uniform dispatch over the configured backends.
#[derive(Debug)]
pub struct Dispatcher {
    openai: Option<Arc<dyn Generator>>,
    groq: Option<Arc<dyn Generator>>,
    gemini: Option<Arc<dyn Generator>>,
    opts: DispatchOpts,
}

impl Dispatcher {
    /// Build drivers for every backend with a configured credential.
    pub fn new(credentials: &Credentials, opts: DispatchOpts) -> Self {
        Self {
            openai: credentials
                .openai_api_key
                .as_deref()
                .map(|key| Arc::new(OpenAiGenerator::openai(key)) as Arc<dyn Generator>),
            groq: credentials
                .groq_api_key
                .as_deref()
                .map(|key| Arc::new(OpenAiGenerator::groq(key)) as Arc<dyn Generator>),
            gemini: credentials
                .gemini_api_key
                .as_deref()
                .map(|key| Arc::new(GeminiGenerator::new(key)) as Arc<dyn Generator>),
            opts,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_generators(
        openai: Option<Arc<dyn Generator>>,
        groq: Option<Arc<dyn Generator>>,
        gemini: Option<Arc<dyn Generator>>,
        opts: DispatchOpts,
    ) -> Self {
        Self {
            openai,
            groq,
            gemini,
            opts,
        }
    }

    fn generator_for(&self, backend: BackendKind) -> Option<&dyn Generator> {
        match backend {
            BackendKind::OpenAi => self.openai.as_deref(),
            BackendKind::Groq => self.groq.as_deref(),
            BackendKind::Gemini => self.gemini.as_deref(),
        }
    }

    /// Ask a provider to answer a question.
    ///
    /// Applies the call timeout, and treats an empty response body as a
    /// provider failure rather than a silent empty answer.
    #[instrument(level = "debug", skip_all, fields(provider = %descriptor.id))]
    pub async fn answer(
        &self,
        descriptor: &ProviderDescriptor,
        question: &str,
    ) -> Result<String, AnswerError> {
        let provider_error = |cause| AnswerError::Provider {
            provider: descriptor.id.to_owned(),
            cause,
        };

        // A known provider whose backend was never configured can only
        // happen via a stale button; report it as a credential problem.
        let generator = self
            .generator_for(descriptor.backend)
            .ok_or_else(|| provider_error(ProviderFailure::Auth))?;

        let call = generator.generate(
            descriptor.model,
            question,
            self.opts.max_completion_tokens,
        );
        let text = match time::timeout(Duration::from_secs(self.opts.timeout), call).await {
            Ok(result) => result.map_err(&provider_error)?,
            Err(_) => return Err(provider_error(ProviderFailure::Timeout)),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(provider_error(ProviderFailure::EmptyResponse));
        }
        Ok(text.to_owned())
    }
}
