//! Generator for the Google Gemini REST API.
//!
//! Gemini has no OpenAI-compatible endpoint worth using, so we call the
//! `generateContent` REST API directly with `reqwest`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderFailure;
use crate::prelude::*;

use super::Generator;

/// The Gemini REST API base.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Driver for Google Gemini.
#[derive(Debug)]
pub struct GeminiGenerator {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl GeminiGenerator {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_owned(),
            api_base: GEMINI_API_BASE.to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[async_trait]
impl Generator for GeminiGenerator {
    #[instrument(level = "debug", skip_all, fields(model = %model))]
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, ProviderFailure> {
        let url = format!("{}/models/{}:generateContent", self.api_base, model);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
            },
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderFailure::Auth);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::Api(format!(
                "HTTP {status}: {}",
                truncate(&detail, 200)
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| ProviderFailure::Malformed(err.to_string()))?;
        trace!(?parsed, "generateContent response");

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }
}

/// Normalize a [`reqwest::Error`] into our failure taxonomy.
fn map_reqwest_error(err: reqwest::Error) -> ProviderFailure {
    if err.is_timeout() {
        ProviderFailure::Timeout
    } else {
        ProviderFailure::Api(err.to_string())
    }
}

/// Clip an error body for display.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_owned()
    } else {
        let clipped: String = s.chars().take(max_chars).collect();
        format!("{clipped}…")
    }
}
