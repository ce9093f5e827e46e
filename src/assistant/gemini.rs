//! Gemini `generateContent` client

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::{Error, Result};

/// Sends a prompt and returns the model's text
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier, for logging
    fn model(&self) -> &str;

    /// Run one completion
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or an API error response
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Google Gemini over plain HTTPS
///
/// No timeout and no retry: a failed call surfaces as an error and the
/// user asks again.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    #[must_use]
    pub fn new(api_key: SecretString, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client from configuration, or `None` when no API key is set
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let key = config.api_key.as_ref()?;
        if key.expose_secret().trim().is_empty() {
            return None;
        }
        Some(Self::new(
            key.clone(),
            config.model.clone(),
            config.base_url.clone(),
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("Gemini error {status}: {body}")));
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Llm("Gemini returned no text".to_string()));
        }

        Ok(text)
    }
}
