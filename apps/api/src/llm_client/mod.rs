//! Generation Client: the single point of entry for all remote model calls.
//!
//! ARCHITECTURAL RULE: No other module may call a provider API directly.
//! All generation goes through `GenerationClient`, which walks an ordered list of
//! providers (primary first) and stops at the first usable completion.
//!
//! Each provider is attempted at most once per request. There is no retry loop and no
//! caching: a failed primary is followed by exactly one fallback attempt.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

pub mod gemini;
pub mod groq;

/// Failure reasons are cut to this many characters before they reach the job record.
const MAX_REASON_CHARS: usize = 200;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider returned empty content")]
    EmptyCompletion,

    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// One provider's failure, kept for the final error report.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no generation providers are configured")]
    NoProviders,

    #[error("all providers failed: {}", describe_failures(.failures))]
    AllFailed { failures: Vec<ProviderFailure> },
}

fn describe_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Primary,
    Fallback,
}

impl ProviderRole {
    fn for_position(index: usize) -> Self {
        if index == 0 {
            ProviderRole::Primary
        } else {
            ProviderRole::Fallback
        }
    }
}

/// Everything needed for one generation call. Built by the prompt builder and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    resume_text: String,
    template: String,
    prompt: String,
    target_model: String,
}

impl GenerationRequest {
    pub(crate) fn new(
        resume_text: String,
        template: String,
        prompt: String,
        target_model: String,
    ) -> Self {
        Self {
            resume_text,
            template,
            prompt,
            target_model,
        }
    }

    pub fn resume_text(&self) -> &str {
        &self.resume_text
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Model the request is aimed at. Only the primary provider honours it; fallbacks
    /// speak a different model catalogue and use their own configured model.
    pub fn target_model(&self) -> &str {
        &self.target_model
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub provider: String,
    pub role: ProviderRole,
    pub model: String,
}

/// Public description of a configured provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub role: ProviderRole,
    pub model: String,
}

/// A remote text-generation service.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    /// Sends `prompt` to `model` and returns the raw completion text.
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ProviderError>;
}

/// Ordered provider chain with a per-call timeout.
#[derive(Clone)]
pub struct GenerationClient {
    providers: Vec<Arc<dyn Provider>>,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(providers: Vec<Arc<dyn Provider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Gemini first, Groq second, skipping whichever has no key.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.provider_timeout + CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
        if let Some(gemini_config) = &config.gemini {
            providers.push(Arc::new(gemini::GeminiProvider::new(
                http.clone(),
                gemini_config.clone(),
            )));
        }
        if let Some(groq_config) = &config.groq {
            providers.push(Arc::new(groq::GroqProvider::new(
                http.clone(),
                groq_config.clone(),
            )));
        }

        Ok(Self::new(providers, config.provider_timeout))
    }

    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers
            .iter()
            .enumerate()
            .map(|(i, p)| ProviderInfo {
                name: p.name().to_string(),
                role: ProviderRole::for_position(i),
                model: p.default_model().to_string(),
            })
            .collect()
    }

    /// The model new requests should target.
    pub fn primary_model(&self) -> &str {
        self.providers
            .first()
            .map(|p| p.default_model())
            .unwrap_or_default()
    }

    /// Tries each provider once, in order, and returns the first non-empty completion.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        if self.providers.is_empty() {
            return Err(GenerationError::NoProviders);
        }

        let mut failures = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            let role = ProviderRole::for_position(index);
            let model = match role {
                ProviderRole::Primary => request.target_model(),
                ProviderRole::Fallback => provider.default_model(),
            };

            info!("Calling {} ({:?}, model {})", provider.name(), role, model);

            let outcome =
                match tokio::time::timeout(self.timeout, provider.complete(request.prompt(), model))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
                };

            match outcome.and_then(non_empty) {
                Ok(text) => {
                    info!(
                        "{} produced {} characters of output",
                        provider.name(),
                        text.len()
                    );
                    return Ok(GenerationResult {
                        text,
                        provider: provider.name().to_string(),
                        role,
                        model: model.to_string(),
                    });
                }
                Err(e) => {
                    warn!("{} failed, moving on: {}", provider.name(), e);
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        reason: truncate(&e.to_string(), MAX_REASON_CHARS),
                    });
                }
            }
        }

        Err(GenerationError::AllFailed { failures })
    }
}

fn non_empty(text: String) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::EmptyCompletion)
    } else {
        Ok(text)
    }
}

/// Error envelope shared by the Gemini and OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Turns non-2xx responses into provider errors and returns the body text otherwise.
pub(crate) async fn read_success_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return Ok(body);
    }

    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    let message = truncate(&message, MAX_REASON_CHARS);

    if status.as_u16() == 429 {
        Err(ProviderError::RateLimited(message))
    } else {
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
