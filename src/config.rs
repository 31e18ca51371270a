//! Credentials from the environment.
//!
//! These may be set in a standard `.env` file; `main` calls
//! [`dotenvy::dotenv`] before we read them.

use crate::prelude::*;

/// All the credentials we know how to use. Which providers appear in the
/// selection menu depends on which of these were present at startup.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    /// Telegram bot token. The only mandatory credential.
    pub telegram_token: Option<String>,

    /// OpenAI API key.
    pub openai_api_key: Option<String>,

    /// Groq API key (used with Groq's OpenAI-compatible endpoint).
    pub groq_api_key: Option<String>,

    /// Google Gemini API key.
    pub gemini_api_key: Option<String>,
}

impl Credentials {
    /// Read credentials from the environment.
    pub fn from_env() -> Self {
        Self {
            telegram_token: env_var("TELEGRAM_TOKEN"),
            openai_api_key: env_var("OPENAI_API_KEY"),
            groq_api_key: env_var("GROQ_API_KEY"),
            gemini_api_key: env_var("GEMINI_API_KEY"),
        }
    }

    /// The Telegram token, or a clear error for the operator.
    pub fn require_telegram_token(&self) -> Result<&str> {
        self.telegram_token
            .as_deref()
            .context("TELEGRAM_TOKEN is not set (see --help)")
    }
}

/// Read an environment variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
